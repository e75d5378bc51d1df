use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{BuilderConfig, ExtractionMethod};
use crate::core::credentials::{
    load_ssh_key, prepare_password_hash, PasswordPrompt, TerminalPrompt,
};
use crate::core::merger::merge_config;
use crate::error::BuildError;
use crate::iso::boot::locate_isohdpfx;
use crate::iso::{
    ImageAssembler, ImageExtractor, InstallerInjector, IsoPackager, LoopMountExtractor,
    XorrisoExtractor,
};
use crate::utils::command::require_tools;
use crate::utils::{ChecksumVerifier, Interrupt, SystemRunner, Workspace};

/// Inputs of a single build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source_iso: PathBuf,
    pub autoinstall_yaml: PathBuf,
    pub ssh_key: PathBuf,
    /// Plaintext password; prompted for when `None`
    pub password: Option<String>,
    pub output_iso: PathBuf,
    /// Expected SHA-256 of the source image
    pub source_sha256: Option<String>,
    /// Write `<output>.sha256` after assembly
    pub write_checksum: bool,
}

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Validate,
    Credentials,
    MergeConfig,
    LocateBootAsset,
    Preflight,
    Extract,
    Inject,
    Assemble,
    Checksum,
}

impl BuildStage {
    pub const ALL: [BuildStage; 9] = [
        BuildStage::Validate,
        BuildStage::Credentials,
        BuildStage::MergeConfig,
        BuildStage::LocateBootAsset,
        BuildStage::Preflight,
        BuildStage::Extract,
        BuildStage::Inject,
        BuildStage::Assemble,
        BuildStage::Checksum,
    ];

    fn position(self) -> usize {
        BuildStage::ALL
            .iter()
            .position(|stage| *stage == self)
            .map_or(0, |i| i + 1)
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Validate => "validate inputs",
            BuildStage::Credentials => "prepare credentials",
            BuildStage::MergeConfig => "merge autoinstall config",
            BuildStage::LocateBootAsset => "locate isohdpfx.bin",
            BuildStage::Preflight => "check host tools",
            BuildStage::Extract => "extract source ISO",
            BuildStage::Inject => "inject autoinstall seed",
            BuildStage::Assemble => "assemble ISO",
            BuildStage::Checksum => "write checksum",
        };
        f.write_str(name)
    }
}

/// Runs the build stages in order and always removes the workspace.
pub struct Builder {
    config: BuilderConfig,
    extractor: Box<dyn ImageExtractor>,
    assembler: Box<dyn ImageAssembler>,
    prompt: Box<dyn PasswordPrompt>,
    checksum_verifier: ChecksumVerifier,
    interrupt: Interrupt,
}

impl Builder {
    /// Builder backed by the host tools selected in `config`
    pub fn new(config: BuilderConfig) -> Self {
        let extractor: Box<dyn ImageExtractor> = match config.extraction {
            ExtractionMethod::LoopMount => Box::new(LoopMountExtractor::new(SystemRunner::new())),
            ExtractionMethod::Xorriso => Box::new(XorrisoExtractor::new(SystemRunner::new())),
        };
        let assembler = Box::new(IsoPackager::new(
            SystemRunner::new(),
            config.volume_label.clone(),
        ));

        Self::with_stages(config, extractor, assembler, Box::new(TerminalPrompt))
    }

    /// Builder with caller-supplied extraction, assembly and prompt stages
    pub fn with_stages(
        config: BuilderConfig,
        extractor: Box<dyn ImageExtractor>,
        assembler: Box<dyn ImageAssembler>,
        prompt: Box<dyn PasswordPrompt>,
    ) -> Self {
        Self {
            config,
            extractor,
            assembler,
            prompt,
            checksum_verifier: ChecksumVerifier::new(),
            interrupt: Interrupt::process(),
        }
    }

    /// Watch `interrupt` instead of the process-wide flag
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Produce the customized image, returning its path.
    pub fn build(&self, request: &BuildRequest) -> Result<PathBuf> {
        info!("Starting ISO build process");

        self.stage(BuildStage::Validate, || self.validate_inputs(request))?;

        let (ssh_key, password_hash) = self.stage(BuildStage::Credentials, || {
            let ssh_key = load_ssh_key(&request.ssh_key)?;
            let hash = prepare_password_hash(request.password.as_deref(), self.prompt.as_ref())?;
            Ok((ssh_key, hash))
        })?;

        let user_data = self.stage(BuildStage::MergeConfig, || {
            merge_config(&request.autoinstall_yaml, &ssh_key, &password_hash, &self.config)
        })?;

        let isohdpfx = self.stage(BuildStage::LocateBootAsset, || {
            locate_isohdpfx(&self.config.isohdpfx_paths)
        })?;

        self.stage(BuildStage::Preflight, || self.check_tools())?;

        let workspace = Workspace::create(self.config.work_dir.as_deref())?;
        let result = self.build_in(&workspace, request, user_data.path(), &isohdpfx);
        workspace.cleanup();
        drop(user_data);
        result.map_err(|e| {
            if self.interrupt.is_set() {
                e.context(BuildError::Interrupted)
            } else {
                e
            }
        })?;

        if request.write_checksum {
            self.stage(BuildStage::Checksum, || {
                self.checksum_verifier
                    .generate_checksum_file(&request.output_iso)
                    .map(|_| ())
            })?;
        }

        info!("ISO build completed successfully");
        Ok(request.output_iso.clone())
    }

    fn build_in(
        &self,
        workspace: &Workspace,
        request: &BuildRequest,
        user_data: &Path,
        isohdpfx: &Path,
    ) -> Result<()> {
        let image_root = self.stage(BuildStage::Extract, || {
            self.extractor.extract(&request.source_iso, workspace)
        })?;

        let report = self.stage(BuildStage::Inject, || {
            InstallerInjector::new(&self.config.meta_data).inject(&image_root, user_data)
        })?;
        if report.patched.is_empty() {
            warn!("No boot menu was patched; the installer will not start unattended");
        }

        self.stage(BuildStage::Assemble, || {
            self.assembler
                .assemble(&image_root, &request.output_iso, isohdpfx)
        })
    }

    fn validate_inputs(&self, request: &BuildRequest) -> Result<()> {
        let inputs = [
            ("source ISO", &request.source_iso),
            ("autoinstall YAML", &request.autoinstall_yaml),
            ("SSH key file", &request.ssh_key),
        ];
        for (what, path) in inputs {
            if !path.exists() {
                return Err(anyhow!(BuildError::NotFound(format!(
                    "{} {}",
                    what,
                    path.display()
                ))));
            }
        }

        match &request.source_sha256 {
            Some(expected) => self
                .checksum_verifier
                .verify_file(&request.source_iso, expected)
                .context("Source ISO checksum verification failed"),
            None => {
                debug!("No source checksum given, skipping verification");
                Ok(())
            }
        }
    }

    fn check_tools(&self) -> Result<()> {
        let mut tools = self.extractor.required_tools();
        for tool in self.assembler.required_tools() {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        require_tools(&tools)
    }

    fn stage<T>(&self, stage: BuildStage, run: impl FnOnce() -> Result<T>) -> Result<T> {
        self.interrupt.check()?;
        info!(
            "[{}/{}] {}",
            stage.position(),
            BuildStage::ALL.len(),
            stage
        );
        run().with_context(|| format!("Failed to {}", stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::MockPasswordPrompt;
    use crate::error::build_error;
    use crate::iso::extractor::MockImageExtractor;
    use crate::iso::packager::MockImageAssembler;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        request: BuildRequest,
        config: BuilderConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source_iso = dir.path().join("ubuntu.iso");
            let autoinstall_yaml = dir.path().join("autoinstall.yaml");
            let ssh_key = dir.path().join("id_ed25519.pub");
            let isohdpfx = dir.path().join("isohdpfx.bin");
            fs::write(&source_iso, b"iso").unwrap();
            fs::write(&autoinstall_yaml, "autoinstall:\n  version: 1\n").unwrap();
            fs::write(&ssh_key, "ssh-ed25519 AAAA... user@host\n").unwrap();
            fs::write(&isohdpfx, b"mbr").unwrap();

            let config = BuilderConfig {
                isohdpfx_paths: vec![isohdpfx],
                work_dir: Some(dir.path().join("work")),
                ..BuilderConfig::default()
            };
            let request = BuildRequest {
                source_iso,
                autoinstall_yaml,
                ssh_key,
                password: Some("Secret123".to_string()),
                output_iso: dir.path().join("out.iso"),
                source_sha256: None,
                write_checksum: false,
            };
            Self {
                dir,
                request,
                config,
            }
        }

        fn work_dir_is_empty(&self) -> bool {
            let work = self.dir.path().join("work");
            !work.exists() || fs::read_dir(work).unwrap().next().is_none()
        }
    }

    fn silent_prompt() -> Box<MockPasswordPrompt> {
        let mut prompt = MockPasswordPrompt::new();
        prompt.expect_read_secret().never();
        Box::new(prompt)
    }

    #[test]
    fn test_missing_asset_fails_before_extraction_and_mastering() {
        let mut fixture = Fixture::new();
        fixture.config.isohdpfx_paths = vec![fixture.dir.path().join("missing.bin")];

        let mut extractor = MockImageExtractor::new();
        extractor.expect_extract().never();
        extractor.expect_required_tools().never();
        let mut assembler = MockImageAssembler::new();
        assembler.expect_assemble().never();
        assembler.expect_required_tools().never();

        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(extractor),
            Box::new(assembler),
            silent_prompt(),
        );
        let err = builder.build(&fixture.request).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::NotFound(_))));
        assert!(format!("{:#}", err).contains("locate isohdpfx.bin"));
        assert!(fixture.work_dir_is_empty());
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let mut fixture = Fixture::new();
        fixture.request.source_iso = fixture.dir.path().join("nope.iso");

        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(MockImageExtractor::new()),
            Box::new(MockImageAssembler::new()),
            silent_prompt(),
        );
        let err = builder.build(&fixture.request).unwrap_err();
        match build_error(&err) {
            Some(BuildError::NotFound(msg)) => assert!(msg.contains("nope.iso")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failed_extraction_still_removes_workspace() {
        let fixture = Fixture::new();

        let mut extractor = MockImageExtractor::new();
        extractor.expect_required_tools().returning(Vec::new);
        extractor.expect_extract().times(1).returning(|_, workspace| {
            let partial = workspace.create_subdirectory("iso_extract")?;
            fs::write(partial.join("casper.squashfs"), b"half")?;
            Err(anyhow!("rsync: connection unexpectedly closed"))
        });
        let mut assembler = MockImageAssembler::new();
        assembler.expect_required_tools().returning(Vec::new);
        assembler.expect_assemble().never();

        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(extractor),
            Box::new(assembler),
            silent_prompt(),
        );
        let err = builder.build(&fixture.request).unwrap_err();
        assert!(format!("{:#}", err).contains("rsync: connection unexpectedly closed"));
        assert!(fixture.work_dir_is_empty());
    }

    #[test]
    fn test_prompted_mismatch_stops_before_merge() {
        let mut fixture = Fixture::new();
        fixture.request.password = None;

        let mut prompt = MockPasswordPrompt::new();
        prompt
            .expect_read_secret()
            .withf(|p| p == "Enter password for autoinstall user")
            .returning(|_| Ok("Secret123".to_string()));
        prompt
            .expect_read_secret()
            .withf(|p| p == "Confirm password")
            .returning(|_| Ok("Secret321".to_string()));

        let mut extractor = MockImageExtractor::new();
        extractor.expect_extract().never();
        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(extractor),
            Box::new(MockImageAssembler::new()),
            Box::new(prompt),
        );
        let err = builder.build(&fixture.request).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Validation(_))));
    }

    #[test]
    fn test_source_checksum_mismatch_is_rejected() {
        let mut fixture = Fixture::new();
        fixture.request.source_sha256 = Some("00".repeat(32));

        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(MockImageExtractor::new()),
            Box::new(MockImageAssembler::new()),
            silent_prompt(),
        );
        let err = builder.build(&fixture.request).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Validation(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupted_extraction_removes_workspace_and_user_data() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        let fixture = Fixture::new();
        let interrupt = Interrupt::new();

        let mut extractor = MockImageExtractor::new();
        extractor.expect_required_tools().returning(Vec::new);
        let signalled = interrupt.clone();
        extractor.expect_extract().times(1).returning(move |_, workspace| {
            let partial = workspace.create_subdirectory("iso_extract")?;
            fs::write(partial.join("filesystem.squashfs"), b"partial copy")?;
            // The terminal delivers SIGINT to the tool and to us at once
            signalled.trigger();
            Err(anyhow!(BuildError::ExternalTool {
                program: "xorriso".to_string(),
                status: ExitStatus::from_raw(2),
                stderr: String::new(),
            }))
        });
        let mut assembler = MockImageAssembler::new();
        assembler.expect_required_tools().returning(Vec::new);
        assembler.expect_assemble().never();

        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(extractor),
            Box::new(assembler),
            silent_prompt(),
        )
        .with_interrupt(interrupt);
        let err = builder.build(&fixture.request).unwrap_err();

        assert!(matches!(build_error(&err), Some(BuildError::Interrupted)));
        assert!(format!("{:#}", err).contains("xorriso"));
        // Covers both the staging copy and the merged user-data file
        assert!(fixture.work_dir_is_empty());
        assert!(!fixture.request.output_iso.exists());
    }

    #[test]
    fn test_pending_interrupt_stops_before_first_stage() {
        let fixture = Fixture::new();
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let mut extractor = MockImageExtractor::new();
        extractor.expect_extract().never();
        let builder = Builder::with_stages(
            fixture.config.clone(),
            Box::new(extractor),
            Box::new(MockImageAssembler::new()),
            silent_prompt(),
        )
        .with_interrupt(interrupt);

        let err = builder.build(&fixture.request).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Interrupted)));
        assert!(fixture.work_dir_is_empty());
    }

    #[test]
    fn test_stage_numbering() {
        assert_eq!(BuildStage::Validate.position(), 1);
        assert_eq!(BuildStage::Checksum.position(), BuildStage::ALL.len());
        assert_eq!(BuildStage::Assemble.to_string(), "assemble ISO");
    }
}
