use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{Error, Result};
use crate::world::World;

pub const WORLD_FILE_EXT: &str = "world";

/// File-backed persistence: one `<world-name>.world` file per world, in the
/// platform user-data directory unless overridden. Files hold the canonical
/// textual form of the world, so saved worlds are valid grammar input.
///
/// All file handles are scoped to a single call; nothing is held across
/// commands.
#[derive(Clone, Debug)]
pub struct WorldStore {
    directory: PathBuf,
}

impl Default for WorldStore {
    fn default() -> Self {
        WorldStore::new()
    }
}

impl WorldStore {
    pub fn new() -> Self {
        WorldStore {
            directory: default_directory(),
        }
    }

    pub fn at(directory: impl Into<PathBuf>) -> Self {
        WorldStore {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }

    /// Write the world's canonical form to `<name>.world`.
    pub fn save(&self, world: &World) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            Error::internal("cannot create world directory")
                .with_data("dir", self.directory.display().to_string())
                .with_data("cause", e.to_string())
        })?;
        let path = self.path_for(world.name());
        fs::write(&path, world.to_string()).map_err(|e| {
            Error::internal("cannot write world file")
                .with_data("path", path.display().to_string())
                .with_data("cause", e.to_string())
        })?;
        debug!(path = %path.display(), "world saved");
        Ok(path)
    }

    /// Load a world by name, or by explicit path when `name` already ends in
    /// `.world`.
    pub fn load(&self, name: &str) -> Result<World> {
        let path = if Path::new(name).extension().is_some_and(|e| e == WORLD_FILE_EXT) {
            PathBuf::from(name)
        } else {
            self.path_for(name)
        };
        let data = fs::read_to_string(&path).map_err(|e| {
            Error::not_found("cannot read world file")
                .with_data("path", path.display().to_string())
                .with_data("cause", e.to_string())
        })?;
        debug!(path = %path.display(), "world loaded");
        data.parse()
    }

    /// Names of every saved world in the store directory.
    pub fn list_worlds(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::internal("cannot scan world directory").with_data("cause", e.to_string())
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == WORLD_FILE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.{WORLD_FILE_EXT}"))
    }
}

fn default_directory() -> PathBuf {
    ProjectDirs::from("", "", "topolith")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join("topolith-data"))
}
