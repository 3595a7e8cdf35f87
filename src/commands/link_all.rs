use anyhow::Result;
use std::sync::Arc;

use crate::link::Linker;
use crate::registry::BitmapRegistry;
use crate::runtime::Runtime;

use super::config::Config;

/// Recreate `node_modules` entries for every tracked component.
#[tracing::instrument(skip(config))]
pub async fn link_all<R: Runtime + 'static>(config: Config<R>) -> Result<()> {
    let registry = BitmapRegistry::load(config.runtime.as_ref(), config.project_root.clone())?;
    let linker = Linker::new(
        Arc::clone(&config.runtime),
        &registry,
        config.project_root.clone(),
        config.settings.clone(),
    );

    let components = linker.link_all_to_node_modules().await?;
    println!(
        "Linked {} component(s) into {}",
        components.len(),
        config.settings.node_modules_dir.display()
    );
    Ok(())
}
