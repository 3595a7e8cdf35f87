//! Path utility functions for normalization and module-path arithmetic.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Only pop a real segment; leading `..` of a relative path must survive
                let can_pop = matches!(
                    result.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    result.pop();
                } else if !result.has_root() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Calculate the relative path from a symlink location to a target.
///
/// For example, a namespace entry at `node_modules/@org/utils.is-string` pointing to
/// `components/utils/is-string` yields `../../components/utils/is-string`.
///
/// Returns `None` if a relative path cannot be computed (e.g., different drive letters on Windows).
pub fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    relative_path_from_dir(from_dir, to_target)
}

/// Calculate the relative path from a directory to a target path.
///
/// Returns `None` if a relative path cannot be computed.
pub fn relative_path_from_dir(from_dir: &Path, to_path: &Path) -> Option<PathBuf> {
    let result = pathdiff::diff_paths(normalize_path(to_path), normalize_path(from_dir))?;

    if result.is_absolute() {
        return None;
    }

    Some(result)
}

/// Resolve a relative path against a base directory.
pub fn resolve_relative_path(base_dir: &Path, relative_path: &Path) -> PathBuf {
    if relative_path.is_absolute() {
        relative_path.to_path_buf()
    } else {
        normalize_path(&base_dir.join(relative_path))
    }
}

/// Render a path with `/` separators, the form module specifiers use on every platform.
pub fn to_module_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the specifier a module in `from_dir` uses to reach `to_path`.
///
/// The result always starts with `./` or `../` so module resolution treats it as a path
/// rather than a package name.
pub fn module_specifier(from_dir: &Path, to_path: &Path) -> Option<String> {
    let relative = to_module_path(&relative_path_from_dir(from_dir, to_path)?);
    if relative.starts_with("../") || relative == ".." {
        Some(relative)
    } else if relative.is_empty() {
        Some(".".to_string())
    } else {
        Some(format!("./{}", relative))
    }
}

/// Drop the extension of the final path segment (`dist/index.js` -> `dist/index`).
pub fn strip_extension(path: &Path) -> PathBuf {
    match path.file_stem() {
        Some(stem) => path.with_file_name(stem),
        None => path.to_path_buf(),
    }
}
