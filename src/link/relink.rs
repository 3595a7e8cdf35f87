//! Re-link propagation to direct dependents of changed components.

use anyhow::Result;
use log::{debug, info};
use std::collections::HashSet;

use crate::manifest::{current_manifest, set_dependency};
use crate::model::{ChangeSet, Component, ComponentId, ManifestWrite, Placements};
use crate::registry::ComponentRegistry;
use crate::runtime::path::relative_path_from_dir;
use crate::runtime::to_module_path;

use super::{
    DependencyLinkGenerator, LinkBatch, LinkSettings, NodeModuleLinker, snapshot_placements,
};

/// What propagation produced, and for whom.
#[derive(Debug, Default)]
pub struct Propagation {
    pub batch: LinkBatch,
    pub dependents: Vec<Component>,
}

/// Brings exposed dependents of changed components in line with their new placement.
///
/// Only direct dependents are visited. A dependent of a dependent keeps whatever
/// links it had, which is correct as long as the intermediate component did not move.
pub struct ReLinkPropagator<'a, G: ComponentRegistry + ?Sized> {
    registry: &'a G,
    settings: &'a LinkSettings,
    npm_style: bool,
}

impl<'a, G: ComponentRegistry + ?Sized> ReLinkPropagator<'a, G> {
    pub fn new(registry: &'a G, settings: &'a LinkSettings, npm_style: bool) -> Self {
        Self {
            registry,
            settings,
            npm_style,
        }
    }

    /// Compute the artifacts of every dependent of `changed`.
    ///
    /// Manifests already scheduled in `pending` are patched on top of, not re-read.
    #[tracing::instrument(skip(self, pending))]
    pub async fn compute(&self, changed: &[ComponentId], pending: &ChangeSet) -> Result<Propagation> {
        if changed.is_empty() {
            return Ok(Propagation::default());
        }

        let candidates = self.registry.dependents_of(changed).await?;
        let placements = snapshot_placements(self.registry, &candidates).await?;

        let mut seen = HashSet::new();
        let dependents: Vec<Component> = candidates
            .into_iter()
            .filter(|d| placements.is_exposed(&d.id) && !changed.contains(&d.id))
            .filter(|d| seen.insert(d.id.clone()))
            .collect();

        if dependents.is_empty() {
            debug!("No exposed dependents to re-link");
            return Ok(Propagation::default());
        }
        info!("Re-linking {} dependent(s)", dependents.len());

        let mut batch =
            DependencyLinkGenerator::new(self.settings, &placements, self.npm_style).compute(&dependents);
        batch.merge(NodeModuleLinker::new(self.settings, &placements).get_links(&dependents));

        for dependent in &dependents {
            if let Some(manifest) = self
                .dependency_declarations(dependent, changed, &placements, pending)
                .await?
            {
                batch.changes.push_manifest(manifest);
            }
        }

        Ok(Propagation { batch, dependents })
    }

    /// Rewrite how `dependent`'s manifest declares each changed dependency.
    async fn dependency_declarations(
        &self,
        dependent: &Component,
        changed: &[ComponentId],
        placements: &Placements,
        pending: &ChangeSet,
    ) -> Result<Option<ManifestWrite>> {
        let Some(root) = &dependent.root_dir else {
            return Ok(None);
        };
        let edges: Vec<_> = dependent
            .dependencies
            .iter()
            .filter(|e| changed.contains(&e.target))
            .collect();
        if edges.is_empty() {
            return Ok(None);
        }

        let Some(mut content) = current_manifest(self.registry, pending, root).await? else {
            debug!("{} has no manifest, keeping declarations as they are", dependent.id);
            return Ok(None);
        };

        for edge in edges {
            let Some(placement) = placements.get(&edge.target) else {
                continue;
            };
            let spec = if placement.is_exposed() {
                edge.target_version.clone().unwrap_or_else(|| "*".to_string())
            } else {
                let Some(relative) = edge
                    .target_root
                    .as_ref()
                    .and_then(|target_root| relative_path_from_dir(root, target_root))
                else {
                    continue;
                };
                format!("file:{}", to_module_path(&relative))
            };

            let package = edge.target.package_name(&self.settings.scope);
            debug!("Declaring {} in {} as {}", package, dependent.id, spec);
            content = set_dependency(root, &content, &package, &spec)?;
        }

        Ok(Some(ManifestWrite {
            root_dir: root.clone(),
            content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlacementState;
    use crate::registry::MockComponentRegistry;
    use crate::test_utils::{component, nested_edge};
    use serde_json::Value;
    use std::path::{Path, PathBuf};

    const MANIFEST: &str = r#"{
  "name": "@org/utils.to-string",
  "dependencies": {
    "@org/utils.is-string": "0.0.1"
  }
}"#;

    fn to_string(target_root: &str) -> Component {
        let mut c = component("utils/to-string", "components/utils/to-string");
        let mut edge = nested_edge("utils/to-string", "utils/is-string", "./is-string", target_root);
        edge.target_version = Some("0.0.2".to_string());
        c.dependencies.push(edge);
        c
    }

    fn registry(dependent: Component, is_string: PlacementState) -> MockComponentRegistry {
        let mut registry = MockComponentRegistry::new();
        registry
            .expect_dependents_of()
            .withf(|ids| ids.len() == 1 && ids[0].as_str() == "utils/is-string")
            .returning(move |_| Ok(vec![dependent.clone()]));
        registry
            .expect_placement_state()
            .returning(move |id| match id.as_str() {
                "utils/is-string" => Ok(is_string),
                _ => Ok(PlacementState::Imported),
            });
        registry
            .expect_read_manifest()
            .withf(|root| root == Path::new("components/utils/to-string"))
            .returning(|_| Ok(Some(MANIFEST.to_string())));
        registry
    }

    fn changed() -> Vec<ComponentId> {
        vec!["utils/is-string".parse().unwrap()]
    }

    fn redirect(propagation: &Propagation) -> Option<&str> {
        propagation
            .batch
            .changes
            .file(Path::new("components/utils/to-string/is-string.js"))
            .and_then(|f| f.source())
    }

    fn declared(propagation: &Propagation) -> Value {
        let manifest = propagation
            .batch
            .changes
            .manifest(Path::new("components/utils/to-string"))
            .unwrap();
        let value: Value = serde_json::from_str(&manifest.content).unwrap();
        value["dependencies"]["@org/utils.is-string"].clone()
    }

    #[tokio::test]
    async fn test_imported_dependency_is_referenced_by_package_name() {
        let registry = registry(to_string("components/utils/is-string"), PlacementState::Imported);
        let settings = LinkSettings::new("@org");

        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&changed(), &ChangeSet::new())
            .await
            .unwrap();

        assert_eq!(propagation.dependents.len(), 1);
        assert_eq!(
            redirect(&propagation),
            Some("module.exports = require('@org/utils.is-string');\n")
        );
        assert_eq!(declared(&propagation), "0.0.2");
        assert!(
            propagation
                .batch
                .changes
                .symlink(Path::new("node_modules/@org/utils.to-string"))
                .is_some()
        );
        assert_eq!(
            propagation.batch.changes.removals,
            [PathBuf::from(
                "components/utils/to-string/node_modules/@org/utils.is-string"
            )]
        );
    }

    #[tokio::test]
    async fn test_bare_import_of_reimported_dependency_drops_nested_entry() {
        let mut dependent = component("utils/to-string", "components/utils/to-string");
        dependent.dependencies.push(nested_edge(
            "utils/to-string",
            "utils/is-string",
            "@org/utils.is-string/lib/check",
            "components/utils/is-string",
        ));
        let registry = registry(dependent, PlacementState::Imported);
        let settings = LinkSettings::new("@org");

        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&changed(), &ChangeSet::new())
            .await
            .unwrap();

        // No redirect for a bare import, only the namespace changes
        assert!(propagation.batch.changes.files.is_empty());
        assert!(propagation.batch.failures.is_empty());
        assert_eq!(
            propagation.batch.changes.removals,
            [PathBuf::from(
                "components/utils/to-string/node_modules/@org/utils.is-string"
            )]
        );
        assert_eq!(declared(&propagation), "*");
    }

    #[tokio::test]
    async fn test_nested_dependency_is_referenced_by_path() {
        let registry = registry(
            to_string("components/.dependencies/utils/is-string/v1"),
            PlacementState::Nested,
        );
        let settings = LinkSettings::new("@org");

        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&changed(), &ChangeSet::new())
            .await
            .unwrap();

        assert_eq!(
            redirect(&propagation),
            Some("module.exports = require('../../.dependencies/utils/is-string/v1/index');\n")
        );
        assert_eq!(
            declared(&propagation),
            "file:../../.dependencies/utils/is-string/v1"
        );
        assert_eq!(
            propagation
                .batch
                .changes
                .symlink(Path::new(
                    "components/utils/to-string/node_modules/@org/utils.is-string"
                ))
                .and_then(|l| l.target()),
            Some(Path::new("components/.dependencies/utils/is-string/v1"))
        );
        assert!(propagation.batch.changes.removals.is_empty());
    }

    #[tokio::test]
    async fn test_nested_and_changed_dependents_are_skipped() {
        let mut registry = MockComponentRegistry::new();
        let nested = component("utils/pad", "components/.dependencies/utils/pad/v1");
        let itself = component("utils/is-string", "components/utils/is-string");
        registry
            .expect_dependents_of()
            .returning(move |_| Ok(vec![nested.clone(), itself.clone()]));
        registry
            .expect_placement_state()
            .returning(|id| match id.as_str() {
                "utils/pad" => Ok(PlacementState::Nested),
                _ => Ok(PlacementState::Imported),
            });
        registry.expect_read_manifest().never();

        let settings = LinkSettings::new("@org");
        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&changed(), &ChangeSet::new())
            .await
            .unwrap();
        assert!(propagation.dependents.is_empty());
        assert!(propagation.batch.changes.is_empty());
    }

    #[tokio::test]
    async fn test_pending_manifest_is_patched_not_reread() {
        let mut registry = MockComponentRegistry::new();
        let dependent = to_string("components/utils/is-string");
        registry
            .expect_dependents_of()
            .returning(move |_| Ok(vec![dependent.clone()]));
        registry
            .expect_placement_state()
            .returning(|_| Ok(PlacementState::Imported));
        registry.expect_read_manifest().never();

        let mut pending = ChangeSet::new();
        pending.push_manifest(ManifestWrite {
            root_dir: PathBuf::from("components/utils/to-string"),
            content: r#"{"name": "to-string", "main": "dist/index.js"}"#.to_string(),
        });

        let settings = LinkSettings::new("@org");
        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&changed(), &pending)
            .await
            .unwrap();

        let manifest = propagation
            .batch
            .changes
            .manifest(Path::new("components/utils/to-string"))
            .unwrap();
        let value: Value = serde_json::from_str(&manifest.content).unwrap();
        assert_eq!(value["main"], "dist/index.js");
        assert_eq!(value["dependencies"]["@org/utils.is-string"], "0.0.2");
    }

    #[tokio::test]
    async fn test_nothing_changed_queries_nothing() {
        let registry = MockComponentRegistry::new();
        let settings = LinkSettings::default();
        let propagation = ReLinkPropagator::new(&registry, &settings, false)
            .compute(&[], &ChangeSet::new())
            .await
            .unwrap();
        assert!(propagation.dependents.is_empty());
    }
}
