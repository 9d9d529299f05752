//! Filesystem-based kit source: `kits_root/<kit>/kit.yaml` plus `files/`.

use std::path::PathBuf;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use rapidkit_core::{
    application::{ApplicationError, ports::KitSource},
    domain::{Kit, KitFile},
    error::RapidkitResult,
};

use super::{read_optional, relative_slash};

pub const KIT_FILE: &str = "kit.yaml";
pub const FILES_DIR: &str = "files";

#[derive(Debug, Clone)]
pub struct FsKitSource {
    kits_root: PathBuf,
}

impl FsKitSource {
    pub fn new(kits_root: impl Into<PathBuf>) -> Self {
        Self {
            kits_root: kits_root.into(),
        }
    }
}

impl KitSource for FsKitSource {
    #[instrument(skip(self), fields(root = %self.kits_root.display()))]
    fn load_kit(&self, name: &str) -> RapidkitResult<(Kit, Vec<KitFile>)> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ApplicationError::KitNotFound { kit: name.to_string() }.into());
        }
        let dir = self.kits_root.join(name);
        let raw = read_optional(&dir.join(KIT_FILE))?
            .ok_or_else(|| ApplicationError::KitNotFound { kit: name.to_string() })?;
        let kit = Kit::parse(&raw)?;

        let files_dir = dir.join(FILES_DIR);
        let mut files = Vec::new();
        if files_dir.is_dir() {
            for entry in WalkDir::new(&files_dir).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    ApplicationError::filesystem(&files_dir, format!("cannot walk kit files: {e}"))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(relative) = relative_slash(&files_dir, entry.path()) else {
                    continue;
                };
                let source = std::fs::read_to_string(entry.path())
                    .map_err(|e| ApplicationError::filesystem(entry.path(), e))?;
                files.push(KitFile { relative, source });
            }
        }
        debug!(kit = %kit.name, files = files.len(), "Loaded kit");
        Ok((kit, files))
    }

    fn list_kits(&self) -> RapidkitResult<Vec<Kit>> {
        let entries = match std::fs::read_dir(&self.kits_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ApplicationError::filesystem(&self.kits_root, e).into()),
        };

        let mut kits = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path().join(KIT_FILE);
            let Some(raw) = read_optional(&path)? else {
                continue;
            };
            match Kit::parse(&raw) {
                Ok(kit) => kits.push(kit),
                // One bad kit must not hide the others.
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid kit"),
            }
        }
        kits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(kits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidkit_core::error::RapidkitError;
    use std::fs;
    use tempfile::TempDir;

    const KIT: &str = "name: fastapi.standard\nversion: 1.0.0\nvariant: fastapi\nengine: python\n";

    fn kit_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let kit = temp.path().join("fastapi.standard");
        fs::create_dir_all(kit.join("files/src")).unwrap();
        fs::write(kit.join(KIT_FILE), KIT).unwrap();
        fs::write(kit.join("files/README.md.j2"), "# {{ project_name }}").unwrap();
        fs::write(kit.join("files/src/main.py"), "print('hi')").unwrap();
        fs::create_dir_all(temp.path().join("broken")).unwrap();
        fs::write(temp.path().join("broken").join(KIT_FILE), "name: [").unwrap();
        temp
    }

    #[test]
    fn loads_kit_files_with_slash_paths() {
        let temp = kit_tree();
        let (kit, files) = FsKitSource::new(temp.path()).load_kit("fastapi.standard").unwrap();
        assert_eq!(kit.variant, "fastapi");
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["README.md.j2", "src/main.py"]);
    }

    #[test]
    fn list_skips_invalid_kits() {
        let temp = kit_tree();
        let kits = FsKitSource::new(temp.path()).list_kits().unwrap();
        assert_eq!(kits.len(), 1);
    }

    #[test]
    fn unknown_kit_is_not_found() {
        let temp = kit_tree();
        let err = FsKitSource::new(temp.path()).load_kit("django").unwrap_err();
        assert!(matches!(
            err,
            RapidkitError::Application(ApplicationError::KitNotFound { .. })
        ));
        assert!(FsKitSource::new(temp.path()).load_kit("../x").is_err());
    }
}
