//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration is read once at startup from a TOML file. A missing file is
//! not fatal: a warning is logged and built-in defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "LOBIT_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "LOBIT_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database, scratch area and public files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// HTTP bind address
    #[serde(default)]
    pub bind_address: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Release pipeline locations
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// archive.org submission settings (optional)
    #[serde(default)]
    pub archive_org: Option<ArchiveOrgSection>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[pipeline]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Scratch directory for downloaded and extracted archives
    #[serde(default)]
    pub tmp_directory: Option<PathBuf>,

    /// Public origin serving release archives (`{static_base}/Releases/{file}`)
    #[serde(default)]
    pub static_base: Option<String>,

    /// Directory backing the public object store
    #[serde(default)]
    pub public_root: Option<PathBuf>,

    /// Prefix under which releases are published
    #[serde(default)]
    pub releases_prefix: Option<String>,
}

/// `[archive_org]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOrgSection {
    #[serde(default = "default_archive_org_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Use a random identifier instead of the catalog number
    #[serde(default)]
    pub use_uuid_identifier: bool,
}

impl Default for ArchiveOrgSection {
    fn default() -> Self {
        Self {
            endpoint: default_archive_org_endpoint(),
            access_key: None,
            secret_key: None,
            collections: Vec::new(),
            uploader: None,
            use_uuid_identifier: false,
        }
    }
}

fn default_archive_org_endpoint() -> String {
    "https://s3.us.archive.org".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when no file is found
    ///
    /// Priority: explicit path, `LOBIT_CONFIG`, platform config locations.
    /// An explicit path that cannot be read is an error; a missing
    /// platform file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&path));
        }

        match locate_config_file() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load_from(&path)
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Find the platform configuration file, if one exists
fn locate_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("lobit").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/lobit/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lobit"))
        .unwrap_or_else(|| PathBuf::from("./lobit_data"))
}

/// Create the root folder if it is missing (safe to call repeatedly)
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder: {}", root_folder.display());
    }
    Ok(())
}

/// Path of the SQLite database inside the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("lobit.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.archive_org.is_none());
    }

    #[test]
    fn test_archive_org_section_defaults_endpoint() {
        let config = TomlConfig::from_toml_str(
            r#"
            [archive_org]
            access_key = "abc"
            secret_key = "def"
            collections = ["opensource_audio", "lobit"]
            "#,
        )
        .unwrap();

        let ia = config.archive_org.unwrap();
        assert_eq!(ia.endpoint, "https://s3.us.archive.org");
        assert_eq!(ia.collections.len(), 2);
        assert!(!ia.use_uuid_identifier);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_database_path_is_inside_root() {
        let root = PathBuf::from("/srv/lobit");
        assert_eq!(database_path(&root), PathBuf::from("/srv/lobit/lobit.db"));
    }
}
