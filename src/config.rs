use crate::errors::{AppError, AppResult, ErrorContextExt};
use directories::BaseDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub use crate::shared::config::{Config, ConnectionConfig, LoggingConfig, QueueConfig};

const CONFIG_DIR: &str = ".live-toasts";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager for live-toasts
///
/// Handles loading, saving, and managing configuration for both project-level
/// and global configurations. Project configurations take precedence over global ones.
///
/// # Configuration Hierarchy
///
/// 1. **Project-level**: `.live-toasts/config.toml` in project root
/// 2. **Global**: `~/.live-toasts/config.toml` in user home directory
///
/// # Example
///
/// ```rust,no_run
/// use live_toasts::config::ConfigManager;
/// use std::path::PathBuf;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config_manager = ConfigManager::new(Some(PathBuf::from("/path/to/project")))?;
///     println!("Endpoint: {}", config_manager.config().connection.url);
///     Ok(())
/// }
/// ```
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Creates a new ConfigManager instance
    ///
    /// With a project path, an existing project config wins, then an existing
    /// global config; if neither exists a project config is created.
    /// Without a project path the global config is loaded or created.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be created, the
    /// file cannot be read or parsed, or the loaded values fail validation.
    pub fn new(project_path: Option<PathBuf>) -> AppResult<Self> {
        let config_path = match project_path {
            Some(path) => {
                let project_config_path = Self::get_config_path(Some(path))?;
                let global_config_path = Self::global_config_path()?;
                if !project_config_path.exists() && global_config_path.exists() {
                    global_config_path
                } else {
                    project_config_path
                }
            }
            None => Self::get_config_path(None)?,
        };

        let config = Self::load_or_create(&config_path)?;
        Ok(ConfigManager { config_path, config })
    }

    /// Always use the project-level file, creating it if needed
    pub fn new_project_config(project_path: PathBuf) -> AppResult<Self> {
        let config_path = Self::get_config_path(Some(project_path))?;
        let config = Self::load_or_create(&config_path)?;
        Ok(ConfigManager { config_path, config })
    }

    /// Resolve the config file path, creating its directory
    pub fn get_config_path(project_path: Option<PathBuf>) -> AppResult<PathBuf> {
        let base_path = match project_path {
            Some(path) => path.join(CONFIG_DIR),
            None => Self::global_base_dir()?,
        };

        fs::create_dir_all(&base_path).in_file_operation(&base_path, "create config directory")?;

        Ok(base_path.join(CONFIG_FILE))
    }

    fn global_base_dir() -> AppResult<PathBuf> {
        let base_dirs = BaseDirs::new().ok_or_else(|| AppError::config("Failed to get base directories"))?;
        Ok(base_dirs.home_dir().join(CONFIG_DIR))
    }

    fn global_config_path() -> AppResult<PathBuf> {
        Ok(Self::global_base_dir()?.join(CONFIG_FILE))
    }

    fn load_or_create(path: &Path) -> AppResult<Config> {
        if path.exists() {
            let content = fs::read_to_string(path).in_file_operation(path, "read config file")?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| AppError::config_with_source("Failed to parse config file", e))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            let content = toml::to_string_pretty(&config)
                .map_err(|e| AppError::config_with_source("Failed to serialize default config", e))?;
            fs::write(path, content).in_file_operation(path, "write default config")?;
            Ok(config)
        }
    }

    /// Write the current configuration back to the file it was loaded from
    pub fn save(&self) -> AppResult<()> {
        self.config.validate()?;
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::config_with_source("Failed to serialize config", e))?;
        fs::write(&self.config_path, content).in_file_operation(&self.config_path, "write config file")?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
