use std::path::{Path, PathBuf};

use crate::error::ResolutionFailure;
use crate::model::{Component, LinkFile};
use crate::runtime::path::strip_extension;
use crate::runtime::to_module_path;

use super::template::ModuleSyntax;

/// Computes the root-level `index` module that makes a component's root importable.
pub struct EntryPointSynthesizer {
    npm_style: bool,
}

impl EntryPointSynthesizer {
    pub fn new(npm_style: bool) -> Self {
        Self { npm_style }
    }

    /// Entry point for `component`, or `None` when its root already resolves on its own.
    ///
    /// The redirect targets the compiled main when the component has build output,
    /// its main source file otherwise.
    pub fn compute(&self, component: &Component) -> Result<Option<LinkFile>, ResolutionFailure> {
        let root = component.root_dir.as_ref().ok_or_else(|| ResolutionFailure {
            dependent: component.id.clone(),
            dependency: component.id.clone(),
            specifier: ".".to_string(),
            reason: "root directory is unknown".to_string(),
        })?;

        let main = component
            .compiled_main
            .as_deref()
            .unwrap_or(&component.main_file);
        let syntax = ModuleSyntax::for_module(main, self.npm_style);
        let entry_name = PathBuf::from(format!("index.{}", syntax.extension()));

        let target = strip_extension(main);
        if target == Path::new("index") || component.files.contains(&entry_name) {
            return Ok(None);
        }

        let reference = format!("./{}", to_module_path(&target));
        Ok(Some(LinkFile::file(
            root.join(entry_name),
            syntax.render(&reference),
            self.npm_style,
        )))
    }
}
