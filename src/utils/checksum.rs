use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::BuildError;

pub struct ChecksumVerifier;

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify_file(&self, file_path: &Path, expected: &str) -> Result<()> {
        info!("Verifying checksum for: {}", file_path.display());
        debug!("Expected SHA-256: {}", expected);

        let calculated = self.calculate_sha256(file_path)?;

        if calculated.eq_ignore_ascii_case(expected.trim()) {
            info!("✓ Checksum verification passed");
            Ok(())
        } else {
            Err(anyhow!(BuildError::Validation(format!(
                "checksum mismatch for {}\nExpected: {}\nCalculated: {}",
                file_path.display(),
                expected,
                calculated
            ))))
        }
    }

    pub fn calculate_sha256(&self, file_path: &Path) -> Result<String> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let mut reader = BufReader::new(file);
        let mut buffer = vec![0; 64 * 1024];
        let mut hasher = Sha256::new();
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .context("Failed to read file data")?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Write `<file>.sha256` next to `file_path` in `sha256sum` format
    pub fn generate_checksum_file(&self, file_path: &Path) -> Result<PathBuf> {
        let checksum = self.calculate_sha256(file_path)?;
        let file_name = file_path
            .file_name()
            .ok_or_else(|| anyhow!("Not a file path: {}", file_path.display()))?
            .to_string_lossy()
            .into_owned();
        let checksum_path = file_path.with_file_name(format!("{}.sha256", file_name));

        let content = format!("{}  {}\n", checksum, file_name);
        std::fs::write(&checksum_path, content).with_context(|| {
            format!("Failed to write checksum file: {}", checksum_path.display())
        })?;

        info!("Generated checksum file: {}", checksum_path.display());
        Ok(checksum_path)
    }
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self::new()
    }
}
