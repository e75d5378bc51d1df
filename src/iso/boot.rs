use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::BuildError;

/// Kernel command line tail present in every stock Ubuntu live boot entry
pub const BOOT_MARKER: &str = "quiet ---";

/// Where the NoCloud datasource finds the injected seed on the booted media
pub const NOCLOUD_SEED: &str = "/cdrom/autoinstall/";

/// Boot menu flavours found on Ubuntu server media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMenu {
    /// `boot/grub/grub.cfg`, used for EFI boot
    Grub,
    /// `isolinux/txt.cfg`, used for legacy BIOS boot
    Isolinux,
}

impl BootMenu {
    pub const ALL: [BootMenu; 2] = [BootMenu::Grub, BootMenu::Isolinux];

    /// Location relative to the image root
    pub fn relative_path(self) -> PathBuf {
        match self {
            BootMenu::Grub => Path::new("boot").join("grub").join("grub.cfg"),
            BootMenu::Isolinux => Path::new("isolinux").join("txt.cfg"),
        }
    }

    /// Autoinstall parameters placed in front of the boot marker.
    ///
    /// GRUB splits commands on an unquoted `;`, so it gets an escaped one;
    /// isolinux passes the line to the kernel verbatim.
    pub fn autoinstall_params(self) -> String {
        let separator = match self {
            BootMenu::Grub => "\\;",
            BootMenu::Isolinux => ";",
        };
        format!("autoinstall ds=nocloud{}s={}", separator, NOCLOUD_SEED)
    }

    /// Insert the autoinstall parameters before every boot marker.
    ///
    /// Returns `None` when the text has no marker.
    pub fn patch(self, text: &str) -> Option<String> {
        if !text.contains(BOOT_MARKER) {
            return None;
        }
        let replacement = format!("{} {}", self.autoinstall_params(), BOOT_MARKER);
        Some(text.replace(BOOT_MARKER, &replacement))
    }
}

/// Outcome of patching one boot menu file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    NoMarker,
    Missing,
}

/// Patch the boot menu of flavour `menu` inside `image_root`, if present
pub fn patch_boot_menu(image_root: &Path, menu: BootMenu) -> Result<PatchOutcome> {
    let cfg_path = image_root.join(menu.relative_path());
    if !cfg_path.exists() {
        debug!("No {:?} boot menu at {}", menu, cfg_path.display());
        return Ok(PatchOutcome::Missing);
    }

    let text = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read boot menu: {}", cfg_path.display()))?;

    match menu.patch(&text) {
        Some(patched) => {
            fs::write(&cfg_path, patched)
                .with_context(|| format!("Failed to write boot menu: {}", cfg_path.display()))?;
            info!("Modified {}", cfg_path.display());
            Ok(PatchOutcome::Patched)
        }
        None => {
            warn!(
                "{} has no '{}' entry, leaving it unchanged",
                cfg_path.display(),
                BOOT_MARKER
            );
            Ok(PatchOutcome::NoMarker)
        }
    }
}

/// Find the syslinux hybrid MBR image needed to make the ISO bootable from
/// USB sticks as well as optical media.
pub fn locate_isohdpfx(candidates: &[PathBuf]) -> Result<PathBuf> {
    for path in candidates {
        if path.exists() {
            info!("Using isohdpfx.bin from: {}", path.display());
            return Ok(path.clone());
        }
        debug!("isohdpfx.bin not at {}", path.display());
    }

    let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    Err(anyhow!(BuildError::NotFound(format!(
        "isohdpfx.bin (searched {}); install syslinux or isolinux",
        searched.join(", ")
    ))))
}
