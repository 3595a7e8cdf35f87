use crate::manifest::MANIFEST_FILE;
use crate::model::ChangeSet;

pub mod config;
mod link;
mod link_all;

pub use link::{LinkOptions, link};
pub use link_all::link_all;

/// Print a change set, one artifact per line.
pub(crate) fn print_changes(changes: &ChangeSet) {
    for file in &changes.files {
        println!("  file      {}", file.path.display());
    }
    for link in &changes.symlinks {
        if let Some(target) = link.target() {
            println!("  symlink   {} -> {}", link.path.display(), target.display());
        }
    }
    for path in &changes.removals {
        println!("  remove    {}", path.display());
    }
    for manifest in &changes.manifests {
        println!(
            "  manifest  {}",
            manifest.root_dir.join(MANIFEST_FILE).display()
        );
    }
}
