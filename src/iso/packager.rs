use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use tracing::info;

use crate::utils::command::{args, CommandRunner};

/// BIOS El Torito boot image and catalog, relative to the image root
const BIOS_BOOT_IMAGE: &str = "isolinux/isolinux.bin";
const BOOT_CATALOG: &str = "isolinux/boot.cat";
/// EFI El Torito boot image, relative to the image root
const EFI_BOOT_IMAGE: &str = "boot/grub/efi.img";

/// Masters a staging tree into the final bootable image.
#[cfg_attr(test, mockall::automock)]
pub trait ImageAssembler {
    fn assemble(&self, image_root: &Path, output: &Path, isohdpfx: &Path) -> Result<()>;

    /// Host programs `assemble` shells out to
    fn required_tools(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Builds a hybrid BIOS/EFI ISO with `xorriso -as mkisofs`.
pub struct IsoPackager<R> {
    runner: R,
    volume_label: String,
}

impl<R: CommandRunner> IsoPackager<R> {
    pub fn new(runner: R, volume_label: impl Into<String>) -> Self {
        Self {
            runner,
            volume_label: volume_label.into(),
        }
    }

    /// Full mkisofs-emulation argument list for one build
    pub fn mastering_args(&self, image_root: &Path, output: &Path, isohdpfx: &Path) -> Vec<OsString> {
        let mut argv = args(["-as", "mkisofs", "-r", "-V", self.volume_label.as_str(), "-o"]);
        argv.push(output.as_os_str().to_os_string());
        argv.extend(args(["-J", "-l", "-cache-inodes", "-isohybrid-mbr"]));
        argv.push(isohdpfx.as_os_str().to_os_string());
        argv.extend(args([
            "-b",
            BIOS_BOOT_IMAGE,
            "-c",
            BOOT_CATALOG,
            "-no-emul-boot",
            "-boot-load-size",
            "4",
            "-boot-info-table",
            "--eltorito-alt-boot",
            "-e",
            EFI_BOOT_IMAGE,
            "-no-emul-boot",
        ]));
        argv.push(image_root.as_os_str().to_os_string());
        argv
    }
}

impl<R: CommandRunner> ImageAssembler for IsoPackager<R> {
    fn assemble(&self, image_root: &Path, output: &Path, isohdpfx: &Path) -> Result<()> {
        info!("Creating new ISO: {}", output.display());

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let argv = self.mastering_args(image_root, output, isohdpfx);
        self.runner
            .run("xorriso", &argv)
            .context("Failed to create final ISO")?;

        info!("Final ISO created: {}", output.display());
        Ok(())
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["xorriso"]
    }
}
