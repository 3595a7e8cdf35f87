//! Component registry boundary.
//!
//! The registry owns which components exist, where they live and how they are
//! placed. The linker only reads from it, plus manifest reads/writes at component
//! roots.

mod bitmap;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::model::{Component, ComponentId, PlacementState};

pub use bitmap::{BITMAP_FILE, Bitmap, BitmapDependency, BitmapEntry, BitmapRegistry};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
    /// Components with their dependency edges resolved against the current placement.
    async fn resolve_components(&self, ids: &[ComponentId]) -> Result<Vec<Component>>;

    async fn placement_state(&self, id: &ComponentId) -> Result<PlacementState>;

    /// Components declaring a direct dependency on any of `ids`.
    async fn dependents_of(&self, ids: &[ComponentId]) -> Result<Vec<Component>>;

    async fn tracked_components(&self) -> Result<Vec<ComponentId>>;

    /// Raw manifest at a component root (project-relative), `None` if there is none.
    async fn read_manifest(&self, root_dir: &Path) -> Result<Option<String>>;

    async fn write_manifest(&self, root_dir: &Path, content: &str) -> Result<()>;
}
