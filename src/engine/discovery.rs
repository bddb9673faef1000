//! Script-discovery collaborator (§1: deliberately out of scope beyond a
//! default implementation).
//!
//! The Engine asks a `ScriptCatalog` for the `standard`/`external` path
//! lists on `showAvailable`; it never scans the filesystem itself.

use std::path::{Path, PathBuf};

use crate::bus::AvailableScriptsEvent;

/// Enumerates the scripts visible under the `standard` and `external` roots.
pub trait ScriptCatalog: Send + Sync {
    fn available(&self) -> AvailableScriptsEvent;
}

/// Default catalog: walks `standardpath`/`externalpath` one level deep and
/// joins the relative `.py` file names with `:`, matching the original
/// `availableScripts` wire format.
pub struct FsScriptCatalog {
    standard_root: PathBuf,
    external_root: PathBuf,
}

impl FsScriptCatalog {
    pub fn new(standard_root: impl Into<PathBuf>, external_root: impl Into<PathBuf>) -> Self {
        Self {
            standard_root: standard_root.into(),
            external_root: external_root.into(),
        }
    }

    fn list(root: &Path) -> String {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names.join(":")
    }
}

impl ScriptCatalog for FsScriptCatalog {
    fn available(&self) -> AvailableScriptsEvent {
        AvailableScriptsEvent {
            standard: Self::list(&self.standard_root),
            external: Self::list(&self.external_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_files_colon_separated_and_sorted() {
        let standard = tempdir().unwrap();
        fs::write(standard.path().join("slew.py"), "").unwrap();
        fs::write(standard.path().join("auxtel.py"), "").unwrap();
        let external = tempdir().unwrap();

        let catalog = FsScriptCatalog::new(standard.path(), external.path());
        let event = catalog.available();

        assert_eq!(event.standard, "auxtel.py:slew.py");
        assert_eq!(event.external, "");
    }

    #[test]
    fn missing_root_yields_empty_listing() {
        let catalog = FsScriptCatalog::new("/nonexistent/standard", "/nonexistent/external");
        let event = catalog.available();
        assert_eq!(event.standard, "");
        assert_eq!(event.external, "");
    }
}
