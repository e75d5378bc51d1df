use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root builder configuration.
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Username used when the base document has no `identity.username`
    pub default_username: String,
    /// Hostname used when the base document has no `identity.hostname`
    pub default_hostname: String,
    /// Interface that gets the DHCP-only netplan stanza
    pub network_device: String,
    pub volume_label: String,
    pub meta_data: MetaDataConfig,
    /// Candidate locations of the syslinux hybrid MBR, searched in order
    pub isohdpfx_paths: Vec<PathBuf>,
    pub extraction: ExtractionMethod,
    /// Parent directory for build workspaces (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            default_username: "ubuntu".to_string(),
            default_hostname: "autoinstall-node".to_string(),
            network_device: "eth0".to_string(),
            volume_label: "Ubuntu-Autoinstall".to_string(),
            meta_data: MetaDataConfig::default(),
            isohdpfx_paths: default_isohdpfx_paths(),
            extraction: ExtractionMethod::default(),
            work_dir: None,
        }
    }
}

/// NoCloud `meta-data` contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaDataConfig {
    pub instance_id: String,
    pub local_hostname: String,
}

impl Default for MetaDataConfig {
    fn default() -> Self {
        Self {
            instance_id: "autoinstall".to_string(),
            local_hostname: "autoinstall".to_string(),
        }
    }
}

/// How the source image contents are copied out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Loopback mount plus rsync (needs root or sudo)
    #[default]
    LoopMount,
    /// xorriso osirrox extraction, no privilege needed
    Xorriso,
}

fn default_isohdpfx_paths() -> Vec<PathBuf> {
    [
        "/usr/lib/ISOLINUX/isohdpfx.bin",      // Ubuntu/Debian
        "/usr/lib/syslinux/bios/isohdpfx.bin", // Arch Linux
        "/usr/share/syslinux/isohdpfx.bin",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}
