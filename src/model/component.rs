use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LinkError;

/// Component identifier in `box/name` form (e.g. `utils/is-string`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId(String);

impl ComponentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package identity under which the component is exposed in the symlink namespace.
    ///
    /// `utils/is-string` in scope `@org` becomes `@org/utils.is-string`.
    pub fn package_name(&self, scope: &str) -> String {
        format!("{}/{}", scope, self.0.replace('/', "."))
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ComponentId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| LinkError::InvalidComponentId {
            id: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("empty id"));
        }
        for segment in s.split('/') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("relative segment"));
            }
            if segment.contains('\\') || segment.contains(char::is_whitespace) {
                return Err(invalid("segments may not contain whitespace or backslashes"));
            }
        }
        Ok(ComponentId(s.to_string()))
    }
}

impl TryFrom<String> for ComponentId {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0
    }
}

/// Where a component lives relative to the user's own work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementState {
    /// Owned source, not a dependency
    Authored,
    /// Explicitly brought in by the user
    Imported,
    /// Present only inside another component's dependency subtree
    Nested,
}

impl PlacementState {
    /// Authored and imported components get a top-level namespace entry and are
    /// referenced by package name; nested ones only through relative paths.
    pub fn is_exposed(&self) -> bool {
        matches!(self, PlacementState::Authored | PlacementState::Imported)
    }
}

impl fmt::Display for PlacementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementState::Authored => write!(f, "authored"),
            PlacementState::Imported => write!(f, "imported"),
            PlacementState::Nested => write!(f, "nested"),
        }
    }
}

/// One resolved dependency of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: ComponentId,
    pub target: ComponentId,
    /// Literal import specifier used in the dependent's source (`./is-string`, `@org/utils.is-string`)
    pub specifier: String,
    /// Dependent files (relative to the dependent's root) that use the specifier
    pub files: Vec<PathBuf>,
    /// Target's root directory at link time, relative to the project root
    pub target_root: Option<PathBuf>,
    pub target_version: Option<String>,
    /// Target's main file, relative to its root
    pub target_main: PathBuf,
    /// Target's compiled main file, relative to its root
    pub target_compiled_main: Option<PathBuf>,
}

impl DependencyEdge {
    /// Whether the specifier addresses a path rather than a package.
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../")
    }

    /// The module a redirect for this edge must reach, relative to the target root.
    pub fn target_module(&self) -> &PathBuf {
        self.target_compiled_main.as_ref().unwrap_or(&self.target_main)
    }
}

/// A component with its resolved dependencies, as handed over by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub version: Option<String>,
    /// Root directory relative to the project root; `None` when the registry cannot locate it
    pub root_dir: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub main_file: PathBuf,
    /// Build output of the main file, relative to the root
    pub compiled_main: Option<PathBuf>,
    pub dependencies: Vec<DependencyEdge>,
}

impl Component {
    pub fn depends_on(&self, id: &ComponentId) -> bool {
        self.dependencies.iter().any(|d| &d.target == id)
    }
}

/// Placement snapshot taken once per linking pass.
#[derive(Debug, Clone, Default)]
pub struct Placements {
    states: HashMap<ComponentId, PlacementState>,
}

impl Placements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ComponentId, state: PlacementState) {
        self.states.insert(id, state);
    }

    pub fn get(&self, id: &ComponentId) -> Option<PlacementState> {
        self.states.get(id).copied()
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.states.contains_key(id)
    }

    pub fn is_exposed(&self, id: &ComponentId) -> bool {
        self.get(id).is_some_and(|p| p.is_exposed())
    }
}

impl FromIterator<(ComponentId, PlacementState)> for Placements {
    fn from_iter<I: IntoIterator<Item = (ComponentId, PlacementState)>>(iter: I) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_parsing() {
        let id: ComponentId = "utils/is-string".parse().unwrap();
        assert_eq!(id.as_str(), "utils/is-string");
        assert_eq!(id.to_string(), "utils/is-string");
    }

    #[test]
    fn test_component_id_rejects_bad_segments() {
        for bad in ["", "utils//is-string", "/utils", "utils/", "../utils", "a b/c", "a\\b"] {
            let err = bad.parse::<ComponentId>().unwrap_err();
            assert!(
                matches!(err, LinkError::InvalidComponentId { .. }),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_package_name() {
        let id: ComponentId = "utils/is-string".parse().unwrap();
        assert_eq!(id.package_name("@org"), "@org/utils.is-string");

        let flat: ComponentId = "logger".parse().unwrap();
        assert_eq!(flat.package_name("@bit"), "@bit/logger");
    }

    #[test]
    fn test_component_id_serde() {
        let id: ComponentId = serde_json::from_str("\"utils/is-string\"").unwrap();
        assert_eq!(id.as_str(), "utils/is-string");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"utils/is-string\"");

        assert!(serde_json::from_str::<ComponentId>("\"utils//x\"").is_err());
    }

    #[test]
    fn test_placement_state_serde_and_exposure() {
        let state: PlacementState = serde_json::from_str("\"nested\"").unwrap();
        assert_eq!(state, PlacementState::Nested);
        assert!(!state.is_exposed());
        assert!(PlacementState::Imported.is_exposed());
        assert!(PlacementState::Authored.is_exposed());
        assert_eq!(PlacementState::Imported.to_string(), "imported");
    }

    #[test]
    fn test_edge_relative_specifier() {
        let mut edge = DependencyEdge {
            source: "utils/to-string".parse().unwrap(),
            target: "utils/is-string".parse().unwrap(),
            specifier: "./is-string".to_string(),
            files: vec![],
            target_root: None,
            target_version: None,
            target_main: PathBuf::from("index.js"),
            target_compiled_main: None,
        };
        assert!(edge.is_relative());
        assert_eq!(edge.target_module(), &PathBuf::from("index.js"));

        edge.specifier = "@org/utils.is-string".to_string();
        edge.target_compiled_main = Some(PathBuf::from("dist/index.js"));
        assert!(!edge.is_relative());
        assert_eq!(edge.target_module(), &PathBuf::from("dist/index.js"));
    }

    #[test]
    fn test_placements_snapshot() {
        let a: ComponentId = "a/one".parse().unwrap();
        let b: ComponentId = "b/two".parse().unwrap();
        let placements: Placements = vec![
            (a.clone(), PlacementState::Imported),
            (b.clone(), PlacementState::Nested),
        ]
        .into_iter()
        .collect();

        assert!(placements.is_exposed(&a));
        assert!(!placements.is_exposed(&b));
        assert!(!placements.is_exposed(&"c/three".parse().unwrap()));
        assert_eq!(placements.get(&b), Some(PlacementState::Nested));
    }
}
