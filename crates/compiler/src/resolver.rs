//! Import path resolution (spec.md §4.3 "Imports", §6 "Module resolution").

use std::path::{Path, PathBuf};

use crate::config::CompilerConfig;

/// Resolve an import path string to a filesystem path, per spec.md §6:
/// `std/...` resolves against the stdlib directory (appending `.opo` if the
/// path has no extension), a leading `/` is used as-is, everything else is
/// relative to `base_dir`.
pub fn resolve_import_path(raw: &str, config: &CompilerConfig) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("std/") {
        let mut path = config.stdlib_dir.join(rest);
        if path.extension().is_none() {
            path.set_extension("opo");
        }
        path
    } else if raw.starts_with('/') {
        PathBuf::from(raw)
    } else {
        config.base_dir.join(raw)
    }
}

/// Canonical key used to detect a second expansion of the same module
/// (spec.md §4.3: "a compiled-module set prevents a second expansion").
/// Falls back to the resolved (non-canonicalized) path when the file does
/// not exist yet, so a not-found error still carries a usable path in the
/// error message.
pub fn module_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CompilerConfig {
        CompilerConfig::new("/proj/src", "/opt/opo/lib")
    }

    #[test]
    fn relative_import_resolves_against_base_dir() {
        let p = resolve_import_path("util.opo", &cfg());
        assert_eq!(p, PathBuf::from("/proj/src/util.opo"));
    }

    #[test]
    fn absolute_import_used_as_is() {
        let p = resolve_import_path("/etc/opo/shared.opo", &cfg());
        assert_eq!(p, PathBuf::from("/etc/opo/shared.opo"));
    }

    #[test]
    fn std_import_resolves_against_stdlib_dir_and_gains_extension() {
        let p = resolve_import_path("std/collections", &cfg());
        assert_eq!(p, PathBuf::from("/opt/opo/lib/collections.opo"));
    }

    #[test]
    fn std_import_with_explicit_extension_untouched() {
        let p = resolve_import_path("std/collections.opo", &cfg());
        assert_eq!(p, PathBuf::from("/opt/opo/lib/collections.opo"));
    }
}
