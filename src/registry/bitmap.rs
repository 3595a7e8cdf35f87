//! File-backed registry reading `.bitmap.json` at the project root.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::manifest::MANIFEST_FILE;
use crate::model::{Component, ComponentId, DependencyEdge, PlacementState};
use crate::runtime::Runtime;

use super::ComponentRegistry;

pub const BITMAP_FILE: &str = ".bitmap.json";

/// On-disk list of tracked components.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Bitmap {
    #[serde(default)]
    pub components: Vec<BitmapEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BitmapEntry {
    pub id: ComponentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Root directory relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    pub placement: PlacementState,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default = "default_main_file")]
    pub main_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_main: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<BitmapDependency>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BitmapDependency {
    pub id: ComponentId,
    pub specifier: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

fn default_main_file() -> PathBuf {
    PathBuf::from("index.js")
}

/// Registry over a project's `.bitmap.json`.
pub struct BitmapRegistry<'a, R: Runtime> {
    runtime: &'a R,
    project_root: PathBuf,
    bitmap: Bitmap,
}

impl<'a, R: Runtime> BitmapRegistry<'a, R> {
    pub fn new(runtime: &'a R, project_root: PathBuf, bitmap: Bitmap) -> Self {
        Self {
            runtime,
            project_root,
            bitmap,
        }
    }

    /// Load the bitmap of `project_root`. A project without one tracks nothing.
    #[tracing::instrument(skip(runtime))]
    pub fn load(runtime: &'a R, project_root: PathBuf) -> Result<Self> {
        let path = project_root.join(BITMAP_FILE);
        let bitmap = if runtime.exists(&path) {
            let content = runtime.read_to_string(&path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse component bitmap {:?}", path))?
        } else {
            debug!("No {} in {:?}, nothing is tracked", BITMAP_FILE, project_root);
            Bitmap::default()
        };
        Ok(Self::new(runtime, project_root, bitmap))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    fn entry(&self, id: &ComponentId) -> Result<&BitmapEntry> {
        match self.bitmap.components.iter().find(|e| &e.id == id) {
            Some(entry) => Ok(entry),
            None => bail!("Component {} is not tracked in {}", id, BITMAP_FILE),
        }
    }

    fn component(&self, entry: &BitmapEntry) -> Component {
        let dependencies = entry
            .dependencies
            .iter()
            .map(|dep| {
                let target = self.bitmap.components.iter().find(|e| e.id == dep.id);
                DependencyEdge {
                    source: entry.id.clone(),
                    target: dep.id.clone(),
                    specifier: dep.specifier.clone(),
                    files: dep.files.clone(),
                    target_root: target.and_then(|t| t.root_dir.clone()),
                    target_version: target.and_then(|t| t.version.clone()),
                    target_main: target
                        .map(|t| t.main_file.clone())
                        .unwrap_or_else(default_main_file),
                    target_compiled_main: target.and_then(|t| t.compiled_main.clone()),
                }
            })
            .collect();

        Component {
            id: entry.id.clone(),
            version: entry.version.clone(),
            root_dir: entry.root_dir.clone(),
            files: entry.files.clone(),
            main_file: entry.main_file.clone(),
            compiled_main: entry.compiled_main.clone(),
            dependencies,
        }
    }

    fn manifest_path(&self, root_dir: &Path) -> PathBuf {
        self.project_root.join(root_dir).join(MANIFEST_FILE)
    }
}

#[async_trait]
impl<'a, R: Runtime> ComponentRegistry for BitmapRegistry<'a, R> {
    async fn resolve_components(&self, ids: &[ComponentId]) -> Result<Vec<Component>> {
        ids.iter()
            .map(|id| self.entry(id).map(|e| self.component(e)))
            .collect()
    }

    async fn placement_state(&self, id: &ComponentId) -> Result<PlacementState> {
        self.entry(id).map(|e| e.placement)
    }

    async fn dependents_of(&self, ids: &[ComponentId]) -> Result<Vec<Component>> {
        Ok(self
            .bitmap
            .components
            .iter()
            .filter(|e| e.dependencies.iter().any(|d| ids.contains(&d.id)))
            .map(|e| self.component(e))
            .collect())
    }

    async fn tracked_components(&self) -> Result<Vec<ComponentId>> {
        Ok(self.bitmap.components.iter().map(|e| e.id.clone()).collect())
    }

    async fn read_manifest(&self, root_dir: &Path) -> Result<Option<String>> {
        let path = self.manifest_path(root_dir);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        self.runtime.read_to_string(&path).map(Some)
    }

    async fn write_manifest(&self, root_dir: &Path, content: &str) -> Result<()> {
        let path = self.manifest_path(root_dir);
        if let Some(parent) = path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime
            .write(&path, content.as_bytes())
            .with_context(|| format!("Failed to write manifest {:?}", path))
    }
}
