use anyhow::{anyhow, Context, Result};
use serde_yaml::{Mapping, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::BuilderConfig;
use crate::error::BuildError;

const AUTOINSTALL_KEY: &str = "autoinstall";
const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Overlay identity, SSH and DHCP network settings onto the base
/// autoinstall document at `base`, writing the result to a temporary
/// `user-data-*.yaml` file under `config.work_dir` (or the system temp dir).
///
/// The file is removed when the returned handle is dropped.
pub fn merge_config(
    base: &Path,
    ssh_key: &str,
    password_hash: &str,
    config: &BuilderConfig,
) -> Result<NamedTempFile> {
    let text = std::fs::read_to_string(base)
        .with_context(|| format!("Failed to read autoinstall document: {}", base.display()))?;

    let document: Value = serde_yaml::from_str(&text).map_err(|e| {
        anyhow!(BuildError::Parse(format!(
            "autoinstall document {}: {}",
            base.display(),
            e
        )))
    })?;

    let merged = merge_document(document, ssh_key, password_hash, config)
        .with_context(|| format!("Failed to merge {}", base.display()))?;

    let mut rendered = serde_yaml::to_string(&merged).context("Failed to serialize user-data")?;
    if has_cloud_config_header(&text) {
        rendered.insert_str(0, &format!("{}\n", CLOUD_CONFIG_HEADER));
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix("user-data-").suffix(".yaml");
    let mut file = match &config.work_dir {
        Some(root) => {
            std::fs::create_dir_all(root).with_context(|| {
                format!("Failed to create work directory root: {}", root.display())
            })?;
            builder.tempfile_in(root)
        }
        None => builder.tempfile(),
    }
    .context("Failed to create temporary user-data file")?;
    file.write_all(rendered.as_bytes())
        .and_then(|_| file.flush())
        .context("Failed to write temporary user-data file")?;

    info!(
        "Credentials and DHCP config injected into: {}",
        file.path().display()
    );
    Ok(file)
}

/// Replace `identity`, `ssh` and `network` under the `autoinstall` key,
/// leaving every other key untouched and in place.
pub fn merge_document(
    document: Value,
    ssh_key: &str,
    password_hash: &str,
    config: &BuilderConfig,
) -> Result<Value> {
    let mut root = match document {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(anyhow!(BuildError::Parse(format!(
                "autoinstall document: expected a mapping at the top level, found {}",
                kind(&other)
            ))))
        }
    };

    let existing = root.get_mut(AUTOINSTALL_KEY).map(std::mem::take);
    let mut autoinstall = match existing {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(mapping)) => mapping,
        Some(other) => {
            return Err(anyhow!(BuildError::Parse(format!(
                "autoinstall document: expected '{}' to be a mapping, found {}",
                AUTOINSTALL_KEY,
                kind(&other)
            ))))
        }
    };

    let (hostname, username) = existing_identity(&autoinstall, config);
    debug!("Using identity {:?}@{:?}", username, hostname);

    let mut identity = Mapping::new();
    identity.insert("hostname".into(), hostname);
    identity.insert("username".into(), username);
    identity.insert("password".into(), password_hash.into());
    autoinstall.insert("identity".into(), Value::Mapping(identity));

    let mut ssh = Mapping::new();
    ssh.insert("install-server".into(), true.into());
    ssh.insert(
        "authorized-keys".into(),
        Value::Sequence(vec![ssh_key.into()]),
    );
    autoinstall.insert("ssh".into(), Value::Mapping(ssh));

    autoinstall.insert("network".into(), dhcp_network(&config.network_device));

    // Inserting over an existing key keeps its slot; new keys are appended.
    root.insert(AUTOINSTALL_KEY.into(), Value::Mapping(autoinstall));
    Ok(Value::Mapping(root))
}

fn existing_identity(autoinstall: &Mapping, config: &BuilderConfig) -> (Value, Value) {
    let identity = autoinstall.get("identity").and_then(Value::as_mapping);
    let field = |name: &str, default: &str| {
        identity
            .and_then(|identity| identity.get(name))
            .filter(|value| !value.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from(default))
    };

    (
        field("hostname", &config.default_hostname),
        field("username", &config.default_username),
    )
}

/// Netplan v2 stanza bringing up one interface with DHCPv4 only
fn dhcp_network(device: &str) -> Value {
    let mut interface = Mapping::new();
    interface.insert("dhcp4".into(), true.into());
    interface.insert("dhcp6".into(), false.into());

    let mut ethernets = Mapping::new();
    ethernets.insert(device.into(), Value::Mapping(interface));

    let mut network = Mapping::new();
    network.insert("version".into(), 2.into());
    network.insert("ethernets".into(), Value::Mapping(ethernets));

    let mut outer = Mapping::new();
    outer.insert("network".into(), Value::Mapping(network));
    Value::Mapping(outer)
}

fn has_cloud_config_header(text: &str) -> bool {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_end().starts_with(CLOUD_CONFIG_HEADER))
        .unwrap_or(false)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
