use crate::common::{DomainError, DomainResult};
use crate::domains::grid_map::{GridLayout, GridLayoutSource};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads grid layouts stored as `<name>.json` (or the exact file name) under
/// a base directory.
pub struct FilesystemLayoutSource {
    base: PathBuf,
}

impl FilesystemLayoutSource {
    /// `base` wins; otherwise `FLEET_LAYOUT_DIR`, then `resources/layouts`
    /// relative to the working directory.
    pub fn new(base: Option<PathBuf>) -> Self {
        let base = base.unwrap_or_else(|| match env::var("FLEET_LAYOUT_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => Path::new("resources/layouts").to_path_buf(),
        });
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let direct = self.base.join(name);
        if direct.extension().is_some() {
            direct
        } else {
            self.base.join(format!("{}.json", name))
        }
    }

    /// Write `layout` as pretty JSON, creating the directory when missing.
    pub fn save_layout(&self, name: &str, layout: &GridLayout) -> DomainResult<()> {
        fs::create_dir_all(&self.base).map_err(|e| DomainError::InfrastructureError(e.to_string()))?;
        let json = serde_json::to_string_pretty(layout)?;
        fs::write(self.resolve(name), json).map_err(|e| DomainError::InfrastructureError(e.to_string()))
    }
}

impl GridLayoutSource for FilesystemLayoutSource {
    fn load_layout(&self, name: &str) -> DomainResult<GridLayout> {
        let path = self.resolve(name);
        let json = fs::read_to_string(&path)
            .map_err(|e| DomainError::InfrastructureError(format!("{}: {}", path.display(), e)))?;
        GridLayout::from_json(&json)
    }
}
