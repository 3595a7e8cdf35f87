//! Redirect modules for dependency specifiers.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::error::ResolutionFailure;
use crate::model::{Component, DependencyEdge, LinkFile, Placements};
use crate::registry::ComponentRegistry;
use crate::runtime::Runtime;
use crate::runtime::path::{module_specifier, normalize_path, strip_extension};

use super::template::{ModuleSyntax, has_module_extension};
use super::{ChangeSetApplier, LinkBatch, LinkSettings};

/// Generates the redirect module each relative dependency specifier resolves to.
///
/// A dependent importing `./is-string` from `index.js` gets an `is-string.js` next to
/// it whose content reaches the dependency: by relative path when the dependency is
/// nested, by package name when it is exposed in the symlink namespace. Bare package
/// specifiers need no redirect; [`super::NodeModuleLinker`] serves them.
pub struct DependencyLinkGenerator<'a> {
    settings: &'a LinkSettings,
    placements: &'a Placements,
    npm_style: bool,
}

impl<'a> DependencyLinkGenerator<'a> {
    pub fn new(settings: &'a LinkSettings, placements: &'a Placements, npm_style: bool) -> Self {
        Self {
            settings,
            placements,
            npm_style,
        }
    }

    /// Compute redirect files for every edge of `components` without touching the disk.
    pub fn compute(&self, components: &[Component]) -> LinkBatch {
        let mut batch = LinkBatch::new();
        for component in components {
            for edge in &component.dependencies {
                match self.edge_links(component, edge) {
                    Ok(links) => batch.changes.extend(links),
                    Err(failure) => {
                        debug!("Cannot link {}: {}", component.id, failure);
                        batch.failures.push(failure);
                    }
                }
            }
        }
        batch
    }

    /// Compute and immediately persist the redirect files.
    pub async fn write<R: Runtime + 'static, G: ComponentRegistry + ?Sized>(
        &self,
        components: &[Component],
        applier: &ChangeSetApplier<'_, R, G>,
    ) -> Result<LinkBatch> {
        let batch = self.compute(components);
        applier.apply(&batch.changes).await?;
        Ok(batch)
    }

    fn edge_links(
        &self,
        component: &Component,
        edge: &DependencyEdge,
    ) -> Result<Vec<LinkFile>, ResolutionFailure> {
        // Bare specifiers resolve through node_modules, not through a redirect
        if !edge.is_relative() {
            return Ok(vec![]);
        }

        let failure = |reason: &str| ResolutionFailure {
            dependent: component.id.clone(),
            dependency: edge.target.clone(),
            specifier: edge.specifier.clone(),
            reason: reason.to_string(),
        };

        let root = component
            .root_dir
            .as_ref()
            .ok_or_else(|| failure("dependent root directory is unknown"))?;
        let target_root = edge
            .target_root
            .as_ref()
            .ok_or_else(|| failure("root directory is unknown"))?;
        let placement = self
            .placements
            .get(&edge.target)
            .ok_or_else(|| failure("placement is unknown"))?;

        let syntax = ModuleSyntax::for_module(edge.target_module(), self.npm_style);
        let target_module = target_root.join(strip_extension(edge.target_module()));

        let importing_dirs: Vec<PathBuf> = if edge.files.is_empty() {
            vec![root.clone()]
        } else {
            edge.files
                .iter()
                .map(|f| match root.join(f).parent() {
                    Some(dir) => dir.to_path_buf(),
                    None => root.clone(),
                })
                .collect()
        };

        let mut links = Vec::with_capacity(importing_dirs.len());
        for dir in importing_dirs {
            let dest = redirect_path(&dir, &edge.specifier, syntax);
            let reference = if placement.is_exposed() {
                edge.target.package_name(&self.settings.scope)
            } else {
                let from_dir = dest.parent().unwrap_or(Path::new(""));
                module_specifier(from_dir, &target_module)
                    .ok_or_else(|| failure("no relative path to the dependency"))?
            };
            links.push(LinkFile::file(dest, syntax.render(&reference), self.npm_style));
        }
        Ok(links)
    }
}

/// Where `specifier`, imported from a module in `dir`, lands on disk.
fn redirect_path(dir: &Path, specifier: &str, syntax: ModuleSyntax) -> PathBuf {
    let dest = normalize_path(&dir.join(specifier));
    if has_module_extension(specifier) {
        return dest;
    }
    let mut name = dest.into_os_string();
    name.push(".");
    name.push(syntax.extension());
    PathBuf::from(name)
}
