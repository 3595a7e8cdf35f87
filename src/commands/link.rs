use anyhow::Result;
use log::debug;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::error::LinkError;
use crate::link::{LinkRequest, Linker};
use crate::model::{Component, ComponentId};
use crate::registry::{BitmapRegistry, ComponentRegistry};
use crate::runtime::Runtime;

use super::config::Config;
use super::print_changes;

/// Flags of the `link` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    pub npm_style: bool,
    pub patch_manifest_main: bool,
    pub dry_run: bool,
}

/// Link the given components (every exposed tracked component when none are given).
#[tracing::instrument(skip(config))]
pub async fn link<R: Runtime + 'static>(config: Config<R>, ids: &[String], options: LinkOptions) -> Result<()> {
    let ids = ids
        .iter()
        .map(|id| id.parse::<ComponentId>())
        .collect::<Result<Vec<_>, _>>()?;

    let registry = BitmapRegistry::load(config.runtime.as_ref(), config.project_root.clone())?;
    let request = build_request(&registry, &ids, options).await?;
    let linker = Linker::new(
        Arc::clone(&config.runtime),
        &registry,
        config.project_root.clone(),
        config.settings.clone(),
    );

    if options.dry_run {
        let changes = linker.get_all_components_links(&request).await?;
        println!("Would apply {} change(s):", changes.len());
        print_changes(&changes);
        return Ok(());
    }

    let touched = linker.link_components(&request).await?;
    println!("Linked {} component(s)", touched.len());
    for component in &touched {
        println!("  {}", component.id);
    }
    Ok(())
}

/// Build a request for `ids` and the tracked components they depend on, transitively.
pub(crate) async fn build_request<G: ComponentRegistry + ?Sized>(
    registry: &G,
    ids: &[ComponentId],
    options: LinkOptions,
) -> Result<LinkRequest> {
    let primary = if ids.is_empty() {
        let mut exposed = vec![];
        for id in registry.tracked_components().await? {
            if registry.placement_state(&id).await?.is_exposed() {
                exposed.push(id);
            }
        }
        exposed
    } else {
        ids.to_vec()
    };
    if primary.is_empty() {
        return Err(LinkError::NothingToLink.into());
    }

    let tracked: HashSet<ComponentId> = registry.tracked_components().await?.into_iter().collect();
    let mut components = registry.resolve_components(&primary).await?;
    let mut seen: HashSet<ComponentId> = primary.iter().cloned().collect();
    let mut queue: VecDeque<ComponentId> = dependency_targets(&components).collect();
    let mut dependencies = vec![];

    while let Some(id) = queue.pop_front() {
        if !tracked.contains(&id) || !seen.insert(id.clone()) {
            continue;
        }
        let resolved = registry.resolve_components(std::slice::from_ref(&id)).await?;
        queue.extend(dependency_targets(&resolved));
        components.extend(resolved);
        dependencies.push(id);
    }
    debug!(
        "Request: {} component(s), {} dependenc(ies)",
        primary.len(),
        dependencies.len()
    );

    Ok(LinkRequest {
        components,
        written_components: primary,
        written_dependencies: (!dependencies.is_empty()).then_some(dependencies),
        npm_style: options.npm_style,
        patch_manifest_main: options.patch_manifest_main,
    })
}

fn dependency_targets(components: &[Component]) -> impl Iterator<Item = ComponentId> + '_ {
    components
        .iter()
        .flat_map(|c| c.dependencies.iter().map(|d| d.target.clone()))
}
