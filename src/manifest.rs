//! Package manifest (`package.json`) updates.
//!
//! Only two fields are ever touched: `main`, and single entries of `dependencies`.
//! Everything else passes through in its original order.

use anyhow::Result;
use log::debug;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::LinkError;
use crate::model::{ChangeSet, Component, ManifestWrite, PlacementState};
use crate::registry::ComponentRegistry;
use crate::runtime::to_module_path;

pub const MANIFEST_FILE: &str = "package.json";

/// Rewrites the `main` field of imported components to their build output.
pub struct ManifestMainPatcher<'a, G: ComponentRegistry + ?Sized> {
    registry: &'a G,
}

impl<'a, G: ComponentRegistry + ?Sized> ManifestMainPatcher<'a, G> {
    pub fn new(registry: &'a G) -> Self {
        Self { registry }
    }

    /// Compute the patched manifest for `component`.
    ///
    /// `pending` holds manifests already scheduled in this pass; they take precedence
    /// over what is on disk so eager and deferred passes see the same content.
    #[tracing::instrument(skip(self, component, pending), fields(id = %component.id))]
    pub async fn compute(
        &self,
        component: &Component,
        placement: Option<PlacementState>,
        pending: &ChangeSet,
    ) -> Result<ManifestWrite> {
        ensure_imported(component, placement)?;

        let root_dir = component
            .root_dir
            .as_ref()
            .ok_or_else(|| LinkError::ManifestNotFound {
                id: component.id.clone(),
                reason: "root directory is unknown".to_string(),
            })?;

        let content = current_manifest(self.registry, pending, root_dir)
            .await?
            .ok_or_else(|| LinkError::ManifestNotFound {
                id: component.id.clone(),
                reason: format!("no {} in {:?}", MANIFEST_FILE, root_dir),
            })?;

        let content = patch_main(component, placement, &content)?;
        debug!("Patched main of {}", component.id);
        Ok(ManifestWrite {
            root_dir: root_dir.clone(),
            content,
        })
    }
}

/// Manifest content for `root_dir`, preferring a write already scheduled in `pending`.
pub(crate) async fn current_manifest<G: ComponentRegistry + ?Sized>(
    registry: &G,
    pending: &ChangeSet,
    root_dir: &Path,
) -> Result<Option<String>> {
    if let Some(scheduled) = pending.manifest(root_dir) {
        return Ok(Some(scheduled.content.clone()));
    }
    registry.read_manifest(root_dir).await
}

/// Rewrite only the `main` field of `content` to the component's compiled main.
pub fn patch_main(
    component: &Component,
    placement: Option<PlacementState>,
    content: &str,
) -> Result<String> {
    ensure_imported(component, placement)?;

    let compiled_main = component.compiled_main.as_ref().ok_or_else(|| {
        LinkError::InvalidRequest(format!(
            "component {} has no build output to point main at",
            component.id
        ))
    })?;

    let path = manifest_path(component.root_dir.as_deref());
    let mut manifest = parse_object(&path, content)?;
    manifest.insert(
        "main".to_string(),
        Value::String(to_module_path(compiled_main)),
    );
    render(&path, manifest)
}

/// Set `dependencies[package]` to `spec`, creating the section when missing.
pub fn set_dependency(root_dir: &Path, content: &str, package: &str, spec: &str) -> Result<String> {
    let path = manifest_path(Some(root_dir));
    let mut manifest = parse_object(&path, content)?;

    let dependencies = manifest
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(dependencies) = dependencies else {
        return Err(LinkError::ManifestMalformed {
            path,
            reason: "'dependencies' is not an object".to_string(),
        }
        .into());
    };
    dependencies.insert(package.to_string(), Value::String(spec.to_string()));

    render(&path, manifest)
}

fn ensure_imported(component: &Component, placement: Option<PlacementState>) -> Result<()> {
    match placement {
        Some(PlacementState::Imported) => Ok(()),
        other => Err(LinkError::ManifestNotFound {
            id: component.id.clone(),
            reason: match other {
                Some(state) => format!("{} components have no materialized manifest", state),
                None => "placement is unknown".to_string(),
            },
        }
        .into()),
    }
}

fn manifest_path(root_dir: Option<&Path>) -> PathBuf {
    root_dir.unwrap_or(Path::new("")).join(MANIFEST_FILE)
}

fn parse_object(path: &Path, content: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(content).map_err(|e| LinkError::ManifestMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(LinkError::ManifestMalformed {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".to_string(),
        }
        .into()),
    }
}

fn render(path: &Path, manifest: Map<String, Value>) -> Result<String> {
    let mut content = serde_json::to_string_pretty(&Value::Object(manifest)).map_err(|e| {
        LinkError::ManifestMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    content.push('\n');
    Ok(content)
}
