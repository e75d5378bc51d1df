use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, warn};

use super::schema::BuilderConfig;
use crate::error::BuildError;

/// ISO 9660 caps the volume identifier at 32 characters
const MAX_VOLUME_LABEL_LEN: usize = 32;

/// Validate the structure of a builder configuration
pub fn validate_config_structure(config: &BuilderConfig) -> Result<()> {
    debug!("Validating builder configuration");

    let hostname = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")?;
    let username = Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$")?;
    let device = Regex::new(r"^[A-Za-z0-9_.:-]{1,15}$")?;

    if !username.is_match(&config.default_username) {
        return Err(invalid(format!(
            "default_username '{}' is not a valid login name",
            config.default_username
        )));
    }

    if !hostname.is_match(&config.default_hostname) {
        return Err(invalid(format!(
            "default_hostname '{}' is not a valid hostname",
            config.default_hostname
        )));
    }

    if !device.is_match(&config.network_device) {
        return Err(invalid(format!(
            "network_device '{}' is not a valid interface name",
            config.network_device
        )));
    }

    if config.volume_label.is_empty() {
        return Err(invalid("volume_label must not be empty".to_string()));
    }
    if config.volume_label.len() > MAX_VOLUME_LABEL_LEN {
        return Err(invalid(format!(
            "volume_label '{}' exceeds {} characters",
            config.volume_label, MAX_VOLUME_LABEL_LEN
        )));
    }

    if config.meta_data.instance_id.trim().is_empty() {
        return Err(invalid("meta_data.instance_id must not be empty".to_string()));
    }

    if config.isohdpfx_paths.is_empty() {
        return Err(invalid(
            "isohdpfx_paths must list at least one location".to_string(),
        ));
    }

    if let Some(work_dir) = &config.work_dir {
        if !work_dir.is_dir() {
            warn!(
                "work_dir {} does not exist yet, it will be created",
                work_dir.display()
            );
        }
    }

    debug!("Builder configuration validation passed");
    Ok(())
}

fn invalid(message: String) -> anyhow::Error {
    anyhow!(BuildError::Validation(message))
}
