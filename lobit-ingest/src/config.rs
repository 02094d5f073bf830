//! Configuration resolution for lobit-ingest
//!
//! Turns the bootstrap TOML plus environment overrides into the settings the
//! pipeline runs with. archive.org credentials resolve with ENV → TOML
//! priority.

use lobit_common::config::{ArchiveOrgSection, TomlConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 6543;

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Default publishing prefix inside the object store
pub const DEFAULT_RELEASES_PREFIX: &str = "Releases";

/// Environment override for the archive.org access key
pub const ARCHIVE_ORG_ACCESS_KEY_ENV: &str = "LOBIT_ARCHIVE_ORG_ACCESS_KEY";

/// Environment override for the archive.org secret key
pub const ARCHIVE_ORG_SECRET_KEY_ENV: &str = "LOBIT_ARCHIVE_ORG_SECRET_KEY";

/// Resolved archive.org settings (credentials present)
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveOrgSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub collections: Vec<String>,
    pub uploader: Option<String>,
    pub use_uuid_identifier: bool,
}

/// Settings of the ingestion service
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub bind_address: String,
    pub port: u16,
    /// Scratch area for downloaded and extracted archives
    pub tmp_directory: PathBuf,
    /// Public origin serving the release archives
    pub static_base: Option<String>,
    /// Directory backing the public object store
    pub public_root: PathBuf,
    pub releases_prefix: String,
    /// `None` when archive.org credentials are not configured
    pub archive_org: Option<ArchiveOrgSettings>,
}

impl IngestConfig {
    /// Resolve settings for a root folder; `port_override` comes from the CLI
    pub fn resolve(root_folder: &Path, toml_config: &TomlConfig, port_override: Option<u16>) -> Self {
        let pipeline = &toml_config.pipeline;

        let static_base = pipeline
            .static_base
            .as_ref()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());
        if static_base.is_none() {
            warn!("pipeline.static_base not configured, archive downloads will fail");
        }

        Self {
            bind_address: toml_config
                .bind_address
                .clone()
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: port_override.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            tmp_directory: pipeline
                .tmp_directory
                .clone()
                .unwrap_or_else(|| root_folder.join("tmp")),
            static_base,
            public_root: pipeline
                .public_root
                .clone()
                .unwrap_or_else(|| root_folder.join("public")),
            releases_prefix: pipeline
                .releases_prefix
                .as_deref()
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_RELEASES_PREFIX.to_string()),
            archive_org: resolve_archive_org(toml_config.archive_org.as_ref()),
        }
    }
}

/// Resolve archive.org settings
///
/// **Priority:** ENV → TOML, per credential. Returns `None` unless both
/// the access key and the secret key are available.
pub fn resolve_archive_org(section: Option<&ArchiveOrgSection>) -> Option<ArchiveOrgSettings> {
    let default_section = ArchiveOrgSection::default();
    let section = section.unwrap_or(&default_section);

    let access_key = resolve_credential(
        ARCHIVE_ORG_ACCESS_KEY_ENV,
        section.access_key.as_deref(),
        "access key",
    );
    let secret_key = resolve_credential(
        ARCHIVE_ORG_SECRET_KEY_ENV,
        section.secret_key.as_deref(),
        "secret key",
    );

    match (access_key, secret_key) {
        (Some(access_key), Some(secret_key)) => Some(ArchiveOrgSettings {
            endpoint: section.endpoint.clone(),
            access_key,
            secret_key,
            collections: section.collections.clone(),
            uploader: section.uploader.clone(),
            use_uuid_identifier: section.use_uuid_identifier,
        }),
        (None, None) => {
            info!("archive.org credentials not configured, submissions disabled");
            None
        }
        _ => {
            warn!("Incomplete archive.org credentials (need access and secret key), submissions disabled");
            None
        }
    }
}

fn resolve_credential(env_var: &str, toml_value: Option<&str>, label: &str) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if is_valid_key(&value) {
            info!("archive.org {} loaded from environment variable", label);
            return Some(value);
        }
    }

    toml_value.filter(|v| is_valid_key(v)).map(|v| {
        info!("archive.org {} loaded from TOML config", label);
        v.to_string()
    })
}

/// Validate credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_defaults_derive_from_root_folder() {
        let config = IngestConfig::resolve(Path::new("/srv/lobit"), &TomlConfig::default(), None);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.tmp_directory, PathBuf::from("/srv/lobit/tmp"));
        assert_eq!(config.public_root, PathBuf::from("/srv/lobit/public"));
        assert_eq!(config.releases_prefix, "Releases");
        assert!(config.static_base.is_none());
    }

    #[test]
    fn test_cli_port_overrides_toml() {
        let toml_config = TomlConfig {
            port: Some(7000),
            ..Default::default()
        };
        assert_eq!(IngestConfig::resolve(Path::new("/r"), &toml_config, Some(8000)).port, 8000);
        assert_eq!(IngestConfig::resolve(Path::new("/r"), &toml_config, None).port, 7000);
    }

    #[test]
    fn test_static_base_trailing_slash_trimmed() {
        let toml_config = TomlConfig::from_toml_str(
            r#"
            [pipeline]
            static_base = "https://static.example.net/"
            releases_prefix = "/Releases/"
            "#,
        )
        .unwrap();

        let config = IngestConfig::resolve(Path::new("/r"), &toml_config, None);
        assert_eq!(config.static_base.as_deref(), Some("https://static.example.net"));
        assert_eq!(config.releases_prefix, "Releases");
    }

    #[test]
    fn test_archive_org_needs_both_credentials() {
        let section = ArchiveOrgSection {
            access_key: Some("access".to_string()),
            ..Default::default()
        };
        // Assumes the override variables are not set in the test environment
        if std::env::var(ARCHIVE_ORG_SECRET_KEY_ENV).is_err() {
            assert!(resolve_archive_org(Some(&section)).is_none());
        }

        let section = ArchiveOrgSection {
            access_key: Some("access".to_string()),
            secret_key: Some("secret".to_string()),
            collections: vec!["opensource_audio".to_string()],
            ..Default::default()
        };
        let settings = resolve_archive_org(Some(&section)).unwrap();
        assert_eq!(settings.endpoint, "https://s3.us.archive.org");
        assert_eq!(settings.collections, vec!["opensource_audio".to_string()]);
    }
}
