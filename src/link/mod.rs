//! Link generation and re-link propagation.
//!
//! A linking pass turns resolved components into the artifacts module resolution
//! needs: redirect modules for each dependency specifier, root entry points, the
//! `node_modules` symlink namespace and manifest updates. Every stage is a pure
//! computation producing a [`ChangeSet`] fragment; [`ChangeSetApplier`] is the only
//! place that touches the filesystem.

mod apply;
mod dependency;
mod entry_point;
mod linker;
mod node_modules;
mod relink;
mod template;

use log::debug;
use std::path::PathBuf;

use crate::error::{LinkError, ResolutionFailure};
use crate::model::{ChangeSet, Component, Placements};
use crate::registry::ComponentRegistry;

pub use apply::ChangeSetApplier;
pub use dependency::DependencyLinkGenerator;
pub use entry_point::EntryPointSynthesizer;
pub use linker::{LinkRequest, Linker};
pub use node_modules::NodeModuleLinker;
pub use relink::{Propagation, ReLinkPropagator};
pub use template::ModuleSyntax;

pub const DEFAULT_SCOPE: &str = "@bit";
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Project-wide knobs of a linking pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// Package scope components are exposed under (e.g. `@org`)
    pub scope: String,
    /// Symlink namespace directory, relative to the project root
    pub node_modules_dir: PathBuf,
    /// Upper bound of concurrent I/O operations within one pipeline step
    pub concurrency: usize,
}

impl LinkSettings {
    pub fn new(scope: &str) -> Self {
        let scope = if scope.starts_with('@') {
            scope.to_string()
        } else {
            format!("@{}", scope)
        };
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            node_modules_dir: PathBuf::from("node_modules"),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Output of one pipeline stage: the artifacts it computed and the edges it could not resolve.
#[derive(Debug, Clone, Default)]
pub struct LinkBatch {
    pub changes: ChangeSet,
    pub failures: Vec<ResolutionFailure>,
}

impl LinkBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `other` into this batch. An edge that failed in several stages is reported once.
    pub fn merge(&mut self, other: LinkBatch) {
        self.changes.merge(other.changes);
        for failure in other.failures {
            if !self.failures.contains(&failure) {
                self.failures.push(failure);
            }
        }
    }

    /// Turn collected failures into a [`LinkError::Resolution`].
    pub fn into_result(self) -> anyhow::Result<ChangeSet> {
        if self.failures.is_empty() {
            Ok(self.changes)
        } else {
            Err(LinkError::Resolution {
                failures: self.failures,
            }
            .into())
        }
    }
}

/// Snapshot the placement of every component and every dependency target in `components`.
///
/// Ids the registry cannot place are left out; stages report them as resolution failures.
pub(crate) async fn snapshot_placements<G: ComponentRegistry + ?Sized>(
    registry: &G,
    components: &[Component],
) -> anyhow::Result<Placements> {
    let mut placements = Placements::new();
    let ids = components.iter().flat_map(|c| {
        std::iter::once(&c.id).chain(c.dependencies.iter().map(|d| &d.target))
    });

    for id in ids {
        if placements.contains(id) {
            continue;
        }
        match registry.placement_state(id).await {
            Ok(state) => placements.insert(id.clone(), state),
            Err(e) => debug!("No placement for {}: {:#}", id, e),
        }
    }

    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlacementState;
    use crate::registry::MockComponentRegistry;
    use crate::test_utils::{component, nested_edge};

    #[test]
    fn test_settings_scope_gets_at_prefix() {
        assert_eq!(LinkSettings::new("org").scope, "@org");
        assert_eq!(LinkSettings::new("@org").scope, "@org");
        assert_eq!(LinkSettings::default().scope, "@bit");
        assert_eq!(LinkSettings::default().with_concurrency(0).concurrency, 1);
    }

    #[test]
    fn test_batch_into_result() {
        assert!(LinkBatch::new().into_result().unwrap().is_empty());

        let mut batch = LinkBatch::new();
        batch.failures.push(ResolutionFailure {
            dependent: "a/b".parse().unwrap(),
            dependency: "c/d".parse().unwrap(),
            specifier: "./d".into(),
            reason: "root directory is unknown".into(),
        });
        let err = batch.into_result().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkError>(),
            Some(LinkError::Resolution { failures }) if failures.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_snapshot_placements_queries_each_id_once() {
        let mut to_string = component("utils/to-string", "components/utils/to-string");
        to_string.dependencies.push(nested_edge(
            "utils/to-string",
            "utils/is-string",
            "./is-string",
            "components/.dependencies/utils/is-string/v1",
        ));
        let mut padder = component("utils/pad", "components/utils/pad");
        padder.dependencies.push(nested_edge(
            "utils/pad",
            "utils/is-string",
            "./is-string",
            "components/.dependencies/utils/is-string/v1",
        ));

        let mut registry = MockComponentRegistry::new();
        registry
            .expect_placement_state()
            .times(3)
            .returning(|id| match id.as_str() {
                "utils/is-string" => Ok(PlacementState::Nested),
                "utils/pad" => anyhow::bail!("Component utils/pad is not tracked"),
                _ => Ok(PlacementState::Imported),
            });

        let placements = snapshot_placements(&registry, &[to_string, padder])
            .await
            .unwrap();

        assert_eq!(
            placements.get(&"utils/is-string".parse().unwrap()),
            Some(PlacementState::Nested)
        );
        assert!(placements.is_exposed(&"utils/to-string".parse().unwrap()));
        assert!(!placements.contains(&"utils/pad".parse().unwrap()));
    }
}
