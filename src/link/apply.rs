use anyhow::{Context, Result, bail};
use futures_util::{StreamExt, TryStreamExt, stream};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::{ChangeSet, LinkFile, ManifestWrite};
use crate::registry::ComponentRegistry;
use crate::runtime::{Runtime, relative_symlink_path};

/// Persists a [`ChangeSet`] under a project root.
///
/// Files, removals, symlinks and manifests are applied as four consecutive batches.
/// Inside a batch up to `concurrency` destinations are written at once, each on the
/// blocking thread pool.
pub struct ChangeSetApplier<'a, R: Runtime + 'static, G: ComponentRegistry + ?Sized> {
    runtime: Arc<R>,
    registry: &'a G,
    project_root: &'a Path,
    concurrency: usize,
}

impl<'a, R: Runtime + 'static, G: ComponentRegistry + ?Sized> ChangeSetApplier<'a, R, G> {
    pub fn new(runtime: Arc<R>, registry: &'a G, project_root: &'a Path, concurrency: usize) -> Self {
        Self {
            runtime,
            registry,
            project_root,
            concurrency: concurrency.max(1),
        }
    }

    #[tracing::instrument(skip(self, changes), fields(len = changes.len()))]
    pub async fn apply(&self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        self.fan_out(&changes.files, write_file::<R>).await?;
        self.fan_out(&changes.removals, remove_entry::<R>).await?;
        self.fan_out(&changes.symlinks, update_symlink::<R>).await?;

        stream::iter(&changes.manifests)
            .map(|manifest| self.write_manifest(manifest))
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        info!(
            "Applied {} file(s), {} removal(s), {} symlink(s), {} manifest(s)",
            changes.files.len(),
            changes.removals.len(),
            changes.symlinks.len(),
            changes.manifests.len()
        );
        Ok(())
    }

    /// Run `op` for every item with at most `concurrency` in flight; the first error wins.
    async fn fan_out<T, F>(&self, items: &[T], op: F) -> Result<()>
    where
        T: Clone + Send + 'static,
        F: Fn(&R, &Path, &T) -> Result<()> + Copy + Send + 'static,
    {
        stream::iter(items.iter().cloned())
            .map(|item| {
                let runtime = Arc::clone(&self.runtime);
                let root = self.project_root.to_path_buf();
                tokio::task::spawn_blocking(move || op(&runtime, &root, &item))
            })
            .buffer_unordered(self.concurrency)
            .map(|joined| joined.context("Link task failed to complete").and_then(|r| r))
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn write_manifest(&self, manifest: &ManifestWrite) -> Result<()> {
        self.registry
            .write_manifest(&manifest.root_dir, &manifest.content)
            .await
            .with_context(|| format!("Failed to update manifest in {:?}", manifest.root_dir))
    }
}

fn ensure_parent<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !runtime.exists(parent)
    {
        runtime.create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file<R: Runtime + ?Sized>(runtime: &R, root: &Path, link: &LinkFile) -> Result<()> {
    let Some(source) = link.source() else {
        bail!("{:?} is not a file artifact", link.path);
    };
    let path = root.join(&link.path);
    ensure_parent(runtime, &path)?;

    if runtime.is_symlink(&path) {
        debug!("Replacing symlink {:?} with a generated file", path);
        runtime.remove_symlink(&path)?;
    } else if runtime.exists(&path)
        && runtime.read_to_string(&path).ok().as_deref() == Some(source)
    {
        debug!("{:?} is up to date", path);
        return Ok(());
    }

    runtime
        .write(&path, source.as_bytes())
        .with_context(|| format!("Failed to write link file {:?}", path))
}

/// Remove a stale namespace entry. Only symlinks are ever deleted.
fn remove_entry<R: Runtime + ?Sized>(runtime: &R, root: &Path, entry: &PathBuf) -> Result<()> {
    let path = root.join(entry);
    if runtime.is_symlink(&path) {
        debug!("Removing stale entry {:?}", path);
        return runtime
            .remove_symlink(&path)
            .with_context(|| format!("Failed to remove stale entry {:?}", path));
    }
    if runtime.exists(&path) {
        warn!("{:?} is not a symlink, leaving it in place", path);
    }
    Ok(())
}

fn update_symlink<R: Runtime + ?Sized>(runtime: &R, root: &Path, link: &LinkFile) -> Result<()> {
    let Some(target) = link.target() else {
        bail!("{:?} is not a symlink artifact", link.path);
    };
    let path = root.join(&link.path);
    let target = relative_symlink_path(&link.path, target).unwrap_or_else(|| root.join(target));

    if runtime.is_symlink(&path) {
        match runtime.read_link(&path) {
            Ok(existing) if existing.components().eq(target.components()) => {
                debug!("{:?} already points to {:?}", path, target);
                return Ok(());
            }
            Ok(existing) => {
                debug!(
                    "{:?} points to {:?}, but should point to {:?}. Updating...",
                    path, existing, target
                );
            }
            Err(_) => debug!("{:?} is unreadable, recreating...", path),
        }
        runtime.remove_symlink(&path)?;
    } else if runtime.exists(&path) {
        bail!("{:?} exists but is not a symlink", path);
    } else {
        ensure_parent(runtime, &path)?;
    }

    runtime
        .symlink(&target, &path)
        .with_context(|| format!("Failed to link {:?} to {:?}", path, target))
}
