//! The `node_modules` symlink namespace.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::error::ResolutionFailure;
use crate::model::{Component, ComponentId, DependencyEdge, LinkFile, PlacementState, Placements};
use crate::registry::ComponentRegistry;
use crate::runtime::Runtime;

use super::{ChangeSetApplier, LinkBatch, LinkSettings};

/// Computes the symlinks standard module resolution follows to find components by name.
///
/// Exposed components get a top-level entry `node_modules/<package name>` pointing at
/// their root. Nested dependencies are only reachable from their direct dependents, so
/// they get an entry inside the dependent's own `node_modules`. Whichever of the two
/// a placement does not call for is scheduled for removal, so a stale entry from a
/// previous placement never shadows the current one.
pub struct NodeModuleLinker<'a> {
    settings: &'a LinkSettings,
    placements: &'a Placements,
}

impl<'a> NodeModuleLinker<'a> {
    pub fn new(settings: &'a LinkSettings, placements: &'a Placements) -> Self {
        Self {
            settings,
            placements,
        }
    }

    /// Compute symlink entries for `components`, in the order given.
    pub fn get_links(&self, components: &[Component]) -> LinkBatch {
        let mut batch = LinkBatch::new();
        for component in components {
            match self.placements.get(&component.id) {
                Some(state) if state.is_exposed() => match self.top_level_link(component) {
                    Ok(link) => batch.changes.push(link),
                    Err(failure) => batch.failures.push(failure),
                },
                Some(_) => batch.changes.push_removal(self.top_level_entry(&component.id)),
                None => debug!("No placement for {}, not exposing it", component.id),
            }

            for edge in &component.dependencies {
                match self.placements.get(&edge.target) {
                    Some(PlacementState::Nested) => match self.nested_link(component, edge) {
                        Ok(Some(link)) => batch.changes.push(link),
                        Ok(None) => {}
                        Err(failure) => batch.failures.push(failure),
                    },
                    Some(_) => {
                        if let Some(root) = &component.root_dir {
                            batch.changes.push_removal(self.nested_entry(root, edge));
                        }
                    }
                    None => {}
                }
            }
        }
        batch
    }

    /// Compute the entries and create them right away.
    pub async fn link<R: Runtime + 'static, G: ComponentRegistry + ?Sized>(
        &self,
        components: &[Component],
        applier: &ChangeSetApplier<'_, R, G>,
    ) -> Result<LinkBatch> {
        let batch = self.get_links(components);
        applier.apply(&batch.changes).await?;
        Ok(batch)
    }

    fn top_level_entry(&self, id: &ComponentId) -> PathBuf {
        self.settings
            .node_modules_dir
            .join(id.package_name(&self.settings.scope))
    }

    fn nested_entry(&self, root: &Path, edge: &DependencyEdge) -> PathBuf {
        let entry = if edge.is_relative() {
            edge.target.package_name(&self.settings.scope)
        } else {
            package_of(&edge.specifier).to_string()
        };
        root.join(&self.settings.node_modules_dir).join(entry)
    }

    fn top_level_link(&self, component: &Component) -> Result<LinkFile, ResolutionFailure> {
        let root = component.root_dir.as_ref().ok_or_else(|| ResolutionFailure {
            dependent: component.id.clone(),
            dependency: component.id.clone(),
            specifier: ".".to_string(),
            reason: "root directory is unknown".to_string(),
        })?;
        Ok(LinkFile::symlink(self.top_level_entry(&component.id), root.clone()))
    }

    fn nested_link(
        &self,
        component: &Component,
        edge: &DependencyEdge,
    ) -> Result<Option<LinkFile>, ResolutionFailure> {
        let (Some(root), Some(target_root)) = (&component.root_dir, &edge.target_root) else {
            // Relative edges are reported by the redirect stage
            if edge.is_relative() {
                debug!("Skipping nested entry {} -> {}", component.id, edge.target);
                return Ok(None);
            }
            let reason = if component.root_dir.is_none() {
                "dependent root directory is unknown"
            } else {
                "root directory is unknown"
            };
            return Err(ResolutionFailure {
                dependent: component.id.clone(),
                dependency: edge.target.clone(),
                specifier: edge.specifier.clone(),
                reason: reason.to_string(),
            });
        };

        Ok(Some(LinkFile::symlink(
            self.nested_entry(root, edge),
            target_root.clone(),
        )))
    }
}

/// Package part of a bare specifier: `@org/pkg/lib/x` -> `@org/pkg`, `pkg/x` -> `pkg`.
fn package_of(specifier: &str) -> &str {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier.match_indices('/').nth(segments - 1) {
        Some((idx, _)) => &specifier[..idx],
        None => specifier,
    }
}
