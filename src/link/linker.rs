use anyhow::Result;
use log::{debug, info};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::LinkError;
use crate::manifest::ManifestMainPatcher;
use crate::model::{ChangeSet, Component, ComponentId, PlacementState, Placements};
use crate::registry::ComponentRegistry;
use crate::runtime::Runtime;

use super::{
    ChangeSetApplier, DependencyLinkGenerator, EntryPointSynthesizer, LinkBatch, LinkSettings,
    NodeModuleLinker, ReLinkPropagator, snapshot_placements,
};

/// Input of one linking pass.
#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    /// Every component taking part in the pass, dependency edges resolved
    pub components: Vec<Component>,
    /// Components the caller just wrote; they get entry points and trigger propagation
    pub written_components: Vec<ComponentId>,
    /// Dependencies the caller wrote as standalone components, if any
    pub written_dependencies: Option<Vec<ComponentId>>,
    /// Generate CommonJS redirects consumable from npm packages
    pub npm_style: bool,
    /// Point manifest `main` at build output instead of generating entry points
    pub patch_manifest_main: bool,
}

impl LinkRequest {
    /// Reject written ids that are not part of the component list.
    pub fn validate(&self) -> Result<()> {
        let known: HashSet<&ComponentId> = self.components.iter().map(|c| &c.id).collect();
        let written = self
            .written_components
            .iter()
            .chain(self.written_dependencies.iter().flatten());
        for id in written {
            if !known.contains(id) {
                return Err(LinkError::InvalidRequest(format!(
                    "{} is marked as written but is not part of the request",
                    id
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| &c.id == id)
    }
}

/// Runs linking passes for a project.
pub struct Linker<'a, R: Runtime + 'static, G: ComponentRegistry + ?Sized> {
    runtime: Arc<R>,
    registry: &'a G,
    project_root: PathBuf,
    settings: LinkSettings,
}

impl<'a, R: Runtime + 'static, G: ComponentRegistry + ?Sized> Linker<'a, R, G> {
    pub fn new(runtime: Arc<R>, registry: &'a G, project_root: PathBuf, settings: LinkSettings) -> Self {
        Self {
            runtime,
            registry,
            project_root,
            settings,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn applier(&self) -> ChangeSetApplier<'_, R, G> {
        ChangeSetApplier::new(
            Arc::clone(&self.runtime),
            self.registry,
            &self.project_root,
            self.settings.concurrency,
        )
    }

    /// Link the request and write every artifact step by step.
    ///
    /// Returns all components touched, including re-linked dependents. When some
    /// edges cannot be resolved, everything else is still written before the
    /// [`LinkError::Resolution`] is returned.
    #[tracing::instrument(skip(self, request), fields(components = request.components.len()))]
    pub async fn link_components(&self, request: &LinkRequest) -> Result<Vec<Component>> {
        let applier = self.applier();
        let (touched, batch) = self.run(request, Some(&applier)).await?;
        batch.into_result()?;
        Ok(touched)
    }

    /// Same pass as [`Self::link_components`], returned as a [`ChangeSet`] instead of written.
    #[tracing::instrument(skip(self, request), fields(components = request.components.len()))]
    pub async fn get_all_components_links(&self, request: &LinkRequest) -> Result<ChangeSet> {
        let (_, batch) = self.run(request, None).await?;
        batch.into_result()
    }

    /// Recreate the symlink namespace entries of every tracked component.
    ///
    /// Redirect modules, entry points and manifests are not regenerated; use
    /// [`Self::link_components`] for a full pass.
    #[tracing::instrument(skip(self))]
    pub async fn link_all_to_node_modules(&self) -> Result<Vec<Component>> {
        let ids = self.registry.tracked_components().await?;
        if ids.is_empty() {
            return Err(LinkError::NothingToLink.into());
        }

        let components = self.registry.resolve_components(&ids).await?;
        let placements = snapshot_placements(self.registry, &components).await?;
        let batch = NodeModuleLinker::new(&self.settings, &placements)
            .link(&components, &self.applier())
            .await?;
        info!("Linked {} component(s) to node_modules", components.len());

        batch.into_result()?;
        Ok(components)
    }

    async fn run(
        &self,
        request: &LinkRequest,
        applier: Option<&ChangeSetApplier<'_, R, G>>,
    ) -> Result<(Vec<Component>, LinkBatch)> {
        request.validate()?;
        let placements = snapshot_placements(self.registry, &request.components).await?;
        let mut pass = LinkBatch::new();

        debug!("Generating dependency links");
        let step = DependencyLinkGenerator::new(&self.settings, &placements, request.npm_style)
            .compute(&request.components);
        commit(&mut pass, step, applier).await?;

        if let Some(dependencies) = &request.written_dependencies {
            debug!("Synthesizing entry points of {} dependencies", dependencies.len());
            let step = self
                .entry_points(request, dependencies, &placements, &pass.changes)
                .await?;
            commit(&mut pass, step, applier).await?;
        }

        debug!("Synthesizing entry points of written components");
        let step = self
            .entry_points(request, &request.written_components, &placements, &pass.changes)
            .await?;
        commit(&mut pass, step, applier).await?;

        debug!("Updating node_modules");
        let step = NodeModuleLinker::new(&self.settings, &placements).get_links(&request.components);
        commit(&mut pass, step, applier).await?;

        let propagation = ReLinkPropagator::new(self.registry, &self.settings, request.npm_style)
            .compute(&request.written_components, &pass.changes)
            .await?;
        commit(&mut pass, propagation.batch, applier).await?;

        let mut touched = request.components.clone();
        for dependent in propagation.dependents {
            if !touched.iter().any(|c| c.id == dependent.id) {
                touched.push(dependent);
            }
        }

        info!(
            "Linked {} component(s): {} artifact(s), {} unresolved edge(s)",
            touched.len(),
            pass.changes.len(),
            pass.failures.len()
        );
        Ok((touched, pass))
    }

    /// Entry points, or manifest-main patches where those take over, for `ids`.
    async fn entry_points(
        &self,
        request: &LinkRequest,
        ids: &[ComponentId],
        placements: &Placements,
        pending: &ChangeSet,
    ) -> Result<LinkBatch> {
        let synthesizer = EntryPointSynthesizer::new(request.npm_style);
        let patcher = ManifestMainPatcher::new(self.registry);
        let mut batch = LinkBatch::new();

        for id in ids {
            let Some(component) = request.component(id) else {
                continue;
            };
            let placement = placements.get(id);

            if patches_main(request, component, placement) {
                let manifest = patcher.compute(component, placement, pending).await?;
                batch.changes.push_manifest(manifest);
                continue;
            }

            match synthesizer.compute(component) {
                Ok(Some(link)) => batch.changes.push(link),
                Ok(None) => debug!("{} needs no entry point", id),
                Err(failure) => batch.failures.push(failure),
            }
        }
        Ok(batch)
    }
}

/// Whether `component`'s manifest `main` is patched in this pass instead of getting an entry point.
fn patches_main(
    request: &LinkRequest,
    component: &Component,
    placement: Option<PlacementState>,
) -> bool {
    request.patch_manifest_main
        && component.compiled_main.is_some()
        && placement == Some(PlacementState::Imported)
}

/// Fold a step into the pass, writing it first when running eagerly.
async fn commit<R: Runtime + 'static, G: ComponentRegistry + ?Sized>(
    pass: &mut LinkBatch,
    step: LinkBatch,
    applier: Option<&ChangeSetApplier<'_, R, G>>,
) -> Result<()> {
    if let Some(applier) = applier {
        applier.apply(&step.changes).await?;
    }
    pass.merge(step);
    Ok(())
}
