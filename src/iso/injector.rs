use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::boot::{patch_boot_menu, BootMenu, PatchOutcome};
use crate::config::MetaDataConfig;

/// Seed directory for the NoCloud datasource, relative to the image root
pub const SEED_DIR: &str = "autoinstall";

/// What an injection changed in the staging tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    pub user_data: PathBuf,
    pub meta_data: PathBuf,
    pub patched: Vec<BootMenu>,
    pub unpatched: Vec<BootMenu>,
}

/// Places the NoCloud seed into an extracted image and points the boot menus at it.
pub struct InstallerInjector<'a> {
    meta_data: &'a MetaDataConfig,
}

impl<'a> InstallerInjector<'a> {
    pub fn new(meta_data: &'a MetaDataConfig) -> Self {
        Self { meta_data }
    }

    pub fn inject(&self, image_root: &Path, user_data: &Path) -> Result<InjectionReport> {
        info!("Injecting autoinstall seed into {}", image_root.display());

        let seed_dir = image_root.join(SEED_DIR);
        fs::create_dir_all(&seed_dir)
            .with_context(|| format!("Failed to create {}", seed_dir.display()))?;

        let user_data_path = seed_dir.join("user-data");
        fs::copy(user_data, &user_data_path).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                user_data.display(),
                user_data_path.display()
            )
        })?;

        let meta_data_path = seed_dir.join("meta-data");
        fs::write(&meta_data_path, self.render_meta_data())
            .with_context(|| format!("Failed to write {}", meta_data_path.display()))?;

        let mut report = InjectionReport {
            user_data: user_data_path,
            meta_data: meta_data_path,
            ..InjectionReport::default()
        };

        for menu in BootMenu::ALL {
            match patch_boot_menu(image_root, menu)? {
                PatchOutcome::Patched => report.patched.push(menu),
                PatchOutcome::NoMarker => report.unpatched.push(menu),
                PatchOutcome::Missing => {}
            }
        }

        Ok(report)
    }

    fn render_meta_data(&self) -> String {
        format!(
            "instance-id: {}\nlocal-hostname: {}\n",
            self.meta_data.instance_id, self.meta_data.local_hostname
        )
    }
}
