use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a link artifact materializes as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkContent {
    /// Generated module source
    File(String),
    /// Symlink to a path relative to the project root
    Symlink(PathBuf),
}

/// One artifact to create, addressed relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFile {
    pub path: PathBuf,
    pub content: LinkContent,
    /// Generated with npm-compatible (CommonJS) syntax
    #[serde(default)]
    pub npm_style: bool,
}

impl LinkFile {
    pub fn file(path: impl Into<PathBuf>, source: impl Into<String>, npm_style: bool) -> Self {
        Self {
            path: path.into(),
            content: LinkContent::File(source.into()),
            npm_style,
        }
    }

    pub fn symlink(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: LinkContent::Symlink(target.into()),
            npm_style: false,
        }
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.content, LinkContent::Symlink(_))
    }

    /// Generated source, if this is a file artifact.
    pub fn source(&self) -> Option<&str> {
        match &self.content {
            LinkContent::File(source) => Some(source),
            LinkContent::Symlink(_) => None,
        }
    }

    /// Symlink target, if this is a symlink artifact.
    pub fn target(&self) -> Option<&Path> {
        match &self.content {
            LinkContent::File(_) => None,
            LinkContent::Symlink(target) => Some(target),
        }
    }
}

/// Full manifest content scheduled for a component root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestWrite {
    pub root_dir: PathBuf,
    pub content: String,
}

/// The applyable result of a linking pass.
///
/// Each destination appears at most once; a later entry for the same destination
/// replaces the earlier one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub files: Vec<LinkFile>,
    pub symlinks: Vec<LinkFile>,
    /// Namespace entries left behind by a previous placement
    #[serde(default)]
    pub removals: Vec<PathBuf>,
    pub manifests: Vec<ManifestWrite>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.symlinks.is_empty()
            && self.removals.is_empty()
            && self.manifests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.symlinks.len() + self.removals.len() + self.manifests.len()
    }

    pub fn push(&mut self, link: LinkFile) {
        // A destination is either a file, a symlink or a removal, never two of them
        self.removals.retain(|p| p != &link.path);
        if link.is_symlink() {
            self.files.retain(|f| f.path != link.path);
            upsert(&mut self.symlinks, link, |a, b| a.path == b.path);
        } else {
            self.symlinks.retain(|s| s.path != link.path);
            upsert(&mut self.files, link, |a, b| a.path == b.path);
        }
    }

    /// Schedule the symlink at `path` for removal, dropping any artifact queued there.
    pub fn push_removal(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.files.retain(|f| f.path != path);
        self.symlinks.retain(|s| s.path != path);
        if !self.removals.contains(&path) {
            self.removals.push(path);
        }
    }

    pub fn push_manifest(&mut self, manifest: ManifestWrite) {
        upsert(&mut self.manifests, manifest, |a, b| a.root_dir == b.root_dir);
    }

    pub fn merge(&mut self, other: ChangeSet) {
        for link in other.files.into_iter().chain(other.symlinks) {
            self.push(link);
        }
        for path in other.removals {
            self.push_removal(path);
        }
        for manifest in other.manifests {
            self.push_manifest(manifest);
        }
    }

    pub fn file(&self, path: &Path) -> Option<&LinkFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn symlink(&self, path: &Path) -> Option<&LinkFile> {
        self.symlinks.iter().find(|s| s.path == path)
    }

    pub fn manifest(&self, root_dir: &Path) -> Option<&ManifestWrite> {
        self.manifests.iter().find(|m| m.root_dir == root_dir)
    }
}

impl Extend<LinkFile> for ChangeSet {
    fn extend<I: IntoIterator<Item = LinkFile>>(&mut self, iter: I) {
        for link in iter {
            self.push(link);
        }
    }
}

impl FromIterator<LinkFile> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = LinkFile>>(iter: I) -> Self {
        let mut changes = ChangeSet::new();
        Extend::extend(&mut changes, iter);
        changes
    }
}

fn upsert<T>(entries: &mut Vec<T>, entry: T, same: impl Fn(&T, &T) -> bool) {
    match entries.iter_mut().find(|e| same(e, &entry)) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_one_entry_per_destination() {
        let mut changes = ChangeSet::new();
        changes.push(LinkFile::symlink("node_modules/@org/a", "components/a"));
        changes.push(LinkFile::symlink("node_modules/@org/b", "components/b"));
        changes.push(LinkFile::symlink("node_modules/@org/a", "components/.dependencies/a/v1"));

        assert_eq!(changes.symlinks.len(), 2);
        // Last writer wins, first position kept
        assert_eq!(changes.symlinks[0].path, PathBuf::from("node_modules/@org/a"));
        assert_eq!(
            changes.symlinks[0].target(),
            Some(Path::new("components/.dependencies/a/v1"))
        );
    }

    #[test]
    fn test_push_file_replaces_symlink_at_same_path() {
        let mut changes = ChangeSet::new();
        changes.push(LinkFile::symlink("components/a/x.js", "components/b"));
        changes.push(LinkFile::file("components/a/x.js", "module.exports = 1;\n", true));

        assert!(changes.symlinks.is_empty());
        assert_eq!(changes.files.len(), 1);
        assert_eq!(
            changes.file(Path::new("components/a/x.js")).and_then(|f| f.source()),
            Some("module.exports = 1;\n")
        );
    }

    #[test]
    fn test_removal_and_link_at_same_path_last_wins() {
        let nested = "components/a/node_modules/@org/b";
        let mut changes = ChangeSet::new();
        changes.push(LinkFile::symlink(nested, "components/.dependencies/b/v1"));
        changes.push_removal(nested);
        assert!(changes.symlinks.is_empty());
        assert_eq!(changes.removals, [PathBuf::from(nested)]);

        changes.push_removal(nested);
        assert_eq!(changes.len(), 1);

        let mut relinked = ChangeSet::new();
        relinked.push(LinkFile::symlink(nested, "components/.dependencies/b/v2"));
        changes.merge(relinked);
        assert!(changes.removals.is_empty());
        assert!(changes.symlink(Path::new(nested)).is_some());
    }

    #[test]
    fn test_merge_replaces_manifests_by_root() {
        let mut first = ChangeSet::new();
        first.push_manifest(ManifestWrite {
            root_dir: PathBuf::from("components/a"),
            content: "{}".into(),
        });

        let mut second = ChangeSet::new();
        second.push_manifest(ManifestWrite {
            root_dir: PathBuf::from("components/a"),
            content: "{\"main\": \"dist/index.js\"}".into(),
        });
        second.push(LinkFile::file("components/a/index.js", "x", false));

        first.merge(second);
        assert_eq!(first.manifests.len(), 1);
        assert_eq!(first.manifests[0].content, "{\"main\": \"dist/index.js\"}");
        assert_eq!(first.len(), 2);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let changes: ChangeSet = vec![LinkFile::symlink("node_modules/@org/a", "components/a")]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(
            json["symlinks"][0]["content"]["symlink"],
            serde_json::json!("components/a")
        );
        assert_eq!(json["files"], serde_json::json!([]));
        assert_eq!(json["removals"], serde_json::json!([]));
    }
}
