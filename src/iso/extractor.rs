use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::utils::command::{args, is_root, CommandRunner};
use crate::utils::fs::{make_tree_writable, Workspace};

const MOUNT_DIR: &str = "iso_mount";
const EXTRACT_DIR: &str = "iso_extract";

/// Copies the contents of a source image into a writable staging tree.
#[cfg_attr(test, mockall::automock)]
pub trait ImageExtractor {
    /// Extract `source` into a directory inside `workspace`, returning that
    /// directory.
    fn extract(&self, source: &Path, workspace: &Workspace) -> Result<PathBuf>;

    /// Host programs `extract` shells out to
    fn required_tools(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Loopback-mounts the image read-only and rsyncs its contents out.
pub struct LoopMountExtractor<R> {
    runner: R,
    sudo: bool,
}

impl<R: CommandRunner> LoopMountExtractor<R> {
    /// Use `sudo` for mounting unless already running as root
    pub fn new(runner: R) -> Self {
        Self::with_sudo(runner, !is_root())
    }

    pub fn with_sudo(runner: R, sudo: bool) -> Self {
        Self { runner, sudo }
    }
}

impl<R: CommandRunner> ImageExtractor for LoopMountExtractor<R> {
    fn extract(&self, source: &Path, workspace: &Workspace) -> Result<PathBuf> {
        info!("Extracting ISO: {}", source.display());

        let mount_point = workspace.create_subdirectory(MOUNT_DIR)?;
        let extract_path = workspace.create_subdirectory(EXTRACT_DIR)?;

        let mount = MountGuard::mount(&self.runner, source, &mount_point, self.sudo)
            .context("Failed to mount ISO")?;

        // Archive mode keeps the image's links, modes and timestamps
        let mut rsync_args = args(["-a"]);
        rsync_args.push(with_trailing_slash(&mount_point));
        rsync_args.push(with_trailing_slash(&extract_path));
        self.runner
            .run("rsync", &rsync_args)
            .context("Failed to copy ISO contents")?;

        mount.unmount().context("Failed to unmount ISO")?;

        make_tree_writable(&extract_path)?;

        info!("Successfully extracted ISO to: {}", extract_path.display());
        Ok(extract_path)
    }

    fn required_tools(&self) -> Vec<&'static str> {
        let mut tools = vec!["mount", "umount", "rsync"];
        if self.sudo {
            tools.push("sudo");
        }
        tools
    }
}

/// Extracts with `xorriso -osirrox`, which reads the ISO 9660 tree directly
/// and needs no privilege.
pub struct XorrisoExtractor<R> {
    runner: R,
}

impl<R: CommandRunner> XorrisoExtractor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> ImageExtractor for XorrisoExtractor<R> {
    fn extract(&self, source: &Path, workspace: &Workspace) -> Result<PathBuf> {
        info!("Extracting ISO with xorriso: {}", source.display());

        let extract_path = workspace.create_subdirectory(EXTRACT_DIR)?;

        let mut argv = args(["-osirrox", "on", "-indev"]);
        argv.push(source.as_os_str().to_os_string());
        argv.extend(args(["-extract", "/"]));
        argv.push(extract_path.as_os_str().to_os_string());

        self.runner
            .run("xorriso", &argv)
            .context("Failed to extract ISO contents")?;

        make_tree_writable(&extract_path)?;

        info!("Successfully extracted ISO to: {}", extract_path.display());
        Ok(extract_path)
    }

    fn required_tools(&self) -> Vec<&'static str> {
        vec!["xorriso"]
    }
}

/// A read-only loop mount that is released when dropped.
pub struct MountGuard<'a> {
    runner: &'a dyn CommandRunner,
    mount_point: PathBuf,
    sudo: bool,
    mounted: bool,
}

impl<'a> MountGuard<'a> {
    pub fn mount(
        runner: &'a dyn CommandRunner,
        image: &Path,
        mount_point: &Path,
        sudo: bool,
    ) -> Result<Self> {
        let mut argv = args(["-o", "loop,ro"]);
        argv.push(image.as_os_str().to_os_string());
        argv.push(mount_point.as_os_str().to_os_string());
        run_privileged(runner, sudo, "mount", argv)?;

        Ok(Self {
            runner,
            mount_point: mount_point.to_path_buf(),
            sudo,
            mounted: true,
        })
    }

    /// Unmount now, reporting failure to the caller
    pub fn unmount(mut self) -> Result<()> {
        self.mounted = false;
        self.release()
    }

    fn release(&self) -> Result<()> {
        run_privileged(
            self.runner,
            self.sudo,
            "umount",
            vec![self.mount_point.as_os_str().to_os_string()],
        )
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if self.mounted {
            self.mounted = false;
            if let Err(e) = self.release() {
                warn!(
                    "Failed to unmount {}: {:#}",
                    self.mount_point.display(),
                    e
                );
            }
        }
    }
}

fn run_privileged(
    runner: &dyn CommandRunner,
    sudo: bool,
    program: &str,
    argv: Vec<OsString>,
) -> Result<()> {
    if sudo {
        let mut sudo_args = vec![OsString::from(program)];
        sudo_args.extend(argv);
        runner.run("sudo", &sudo_args)
    } else {
        runner.run(program, &argv)
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    s.push("/");
    s
}
