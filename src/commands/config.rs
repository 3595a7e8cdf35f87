use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::link::LinkSettings;
use crate::runtime::Runtime;

pub const CONCURRENCY_ENV: &str = "BITLINK_CONCURRENCY";

pub struct Config<R: Runtime> {
    pub runtime: Arc<R>,
    pub project_root: PathBuf,
    pub settings: LinkSettings,
}

impl<R: Runtime> Config<R> {
    /// Resolve the project root (current directory unless given) and link settings.
    pub fn new(runtime: R, project: Option<PathBuf>, scope: &str) -> Result<Self> {
        let project_root = match project {
            Some(path) => path,
            None => runtime.current_dir()?,
        };

        let mut settings = LinkSettings::new(scope);
        if let Ok(value) = runtime.env_var(CONCURRENCY_ENV) {
            let concurrency = value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid {}: '{}'", CONCURRENCY_ENV, value))?;
            debug!("Using {} concurrent link operations", concurrency);
            settings = settings.with_concurrency(concurrency);
        }

        Ok(Self {
            runtime: Arc::new(runtime),
            project_root,
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::DEFAULT_CONCURRENCY;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn runtime_with_concurrency(value: Option<&str>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        let value = value.map(|v| v.to_string());
        runtime
            .expect_env_var()
            .with(eq(CONCURRENCY_ENV))
            .returning(move |_| value.clone().ok_or(std::env::VarError::NotPresent));
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work/project")));
        runtime
    }

    #[test]
    fn test_defaults_to_current_dir() {
        let config = Config::new(runtime_with_concurrency(None), None, "org").unwrap();
        assert_eq!(config.project_root, PathBuf::from("/work/project"));
        assert_eq!(config.settings.scope, "@org");
        assert_eq!(config.settings.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_explicit_project_and_concurrency() {
        let config = Config::new(
            runtime_with_concurrency(Some("2")),
            Some(PathBuf::from("/elsewhere")),
            "@bit",
        )
        .unwrap();
        assert_eq!(config.project_root, PathBuf::from("/elsewhere"));
        assert_eq!(config.settings.concurrency, 2);
    }

    #[test]
    fn test_invalid_concurrency() {
        let err = Config::new(runtime_with_concurrency(Some("many")), None, "@bit")
            .err()
            .unwrap();
        assert!(err.to_string().contains(CONCURRENCY_ENV));
    }
}
