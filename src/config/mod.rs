use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub mod schema;
pub mod validation;

pub use schema::{BuilderConfig, ExtractionMethod, MetaDataConfig};

use crate::error::BuildError;

/// Load and validate a builder configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BuilderConfig> {
    let path = path.as_ref();
    info!("Loading configuration from {}", path.display());

    if !path.exists() {
        return Err(anyhow!(BuildError::NotFound(format!(
            "config file {}",
            path.display()
        ))));
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: BuilderConfig = serde_json::from_str(&contents).map_err(|e| {
        anyhow!(BuildError::Parse(format!(
            "config file {}: {}",
            path.display(),
            e
        )))
    })?;

    validation::validate_config_structure(&config)
        .with_context(|| format!("Invalid configuration in file: {}", path.display()))?;

    debug!("Successfully loaded config: {:#?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::build_error;
    use std::path::PathBuf;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.json");
        fs::write(
            &path,
            r#"{ "default_hostname": "lab-node", "extraction": "xorriso" }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.default_hostname, "lab-node");
        assert_eq!(config.default_username, "ubuntu");
        assert_eq!(config.extraction, ExtractionMethod::Xorriso);
        assert_eq!(config.meta_data.instance_id, "autoinstall");
    }

    #[test]
    fn test_custom_asset_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.json");
        fs::write(&path, r#"{ "isohdpfx_paths": ["/opt/syslinux/isohdpfx.bin"] }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.isohdpfx_paths,
            vec![PathBuf::from("/opt/syslinux/isohdpfx.bin")]
        );
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Parse(_))));
    }

    #[test]
    fn test_missing_config_is_not_found() {
        let err = load_config("/nonexistent/builder.json").unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::NotFound(_))));
    }
}
