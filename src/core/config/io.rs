use crate::core::config::data::{path_display, Config};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
    Write { path: PathBuf, source: io::Error },
    /// The platform has no configuration directory and no path was given.
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {source}", path_display(path))
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {source}", path_display(path))
            }
            ConfigError::Serialize(source) => write!(f, "Could not encode configuration: {source}"),
            ConfigError::Write { path, source } => {
                write!(f, "Failed to write config at {}: {source}", path_display(path))
            }
            ConfigError::NoConfigDir => {
                f.write_str("No configuration directory is available on this system. Pass --config <path>.")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(source) => Some(source),
            ConfigError::NoConfigDir => None,
        }
    }
}

impl Config {
    /// Reads `path`, or returns the defaults when no file exists there yet.
    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replaces `path` atomically, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let write_error = |source: io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_error)?;

        let mut staged = NamedTempFile::new_in(dir).map_err(write_error)?;
        staged.write_all(contents.as_bytes()).map_err(write_error)?;
        staged.as_file().sync_all().map_err(write_error)?;
        staged
            .persist(path)
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "repolens", "repolens")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// `--config` when given, else the platform default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        explicit
            .map(Path::to_path_buf)
            .map_or_else(Self::default_config_path, Ok)
    }
}
