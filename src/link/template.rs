use std::path::Path;

/// Syntax of a generated redirect module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSyntax {
    CommonJs,
    EsModule,
}

impl ModuleSyntax {
    /// Pick the syntax for a redirect that reaches `module`.
    ///
    /// npm-style redirects are always CommonJS so any consumer installed from a registry
    /// can `require` them; otherwise TypeScript sources get an ES re-export.
    pub fn for_module(module: &Path, npm_style: bool) -> Self {
        if npm_style {
            return ModuleSyntax::CommonJs;
        }
        match module.extension().and_then(|e| e.to_str()) {
            Some("ts") | Some("tsx") => ModuleSyntax::EsModule,
            _ => ModuleSyntax::CommonJs,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ModuleSyntax::CommonJs => "js",
            ModuleSyntax::EsModule => "ts",
        }
    }

    pub fn render(&self, reference: &str) -> String {
        match self {
            ModuleSyntax::CommonJs => format!("module.exports = require('{}');\n", reference),
            ModuleSyntax::EsModule => format!("export * from '{}';\n", reference),
        }
    }
}

/// Whether a specifier already names a module file, in which case no extension is appended.
pub(crate) fn has_module_extension(specifier: &str) -> bool {
    matches!(
        Path::new(specifier).extension().and_then(|e| e.to_str()),
        Some("js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx")
    )
}
