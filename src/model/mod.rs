//! Link data model: components as handed over by the registry and the artifacts
//! a linking pass produces.

mod component;
mod link_file;

pub use component::{Component, ComponentId, DependencyEdge, PlacementState, Placements};
pub use link_file::{ChangeSet, LinkContent, LinkFile, ManifestWrite};
