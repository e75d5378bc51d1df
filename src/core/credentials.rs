//! SSH key loading and password hashing for the installer identity.

use anyhow::{anyhow, Context, Result};
use dialoguer::Password;
use sha_crypt::{sha512_check, sha512_simple, Sha512Params};
use std::path::Path;
use tracing::info;

use crate::error::BuildError;

/// Masked secret input.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordPrompt {
    fn read_secret(&self, prompt: &str) -> Result<String>;
}

/// Reads secrets from the controlling terminal without echo
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_secret(&self, prompt: &str) -> Result<String> {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .context("Failed to read password from terminal")
    }
}

/// Read a public key file, returning its trimmed contents
pub fn load_ssh_key(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow!(BuildError::NotFound(format!(
            "SSH key file {}",
            path.display()
        ))));
    }

    let key = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read SSH key file: {}", path.display()))?
        .trim()
        .to_string();

    if key.is_empty() {
        return Err(anyhow!(BuildError::Validation(format!(
            "SSH key file {} is empty",
            path.display()
        ))));
    }

    info!("Loaded SSH key from {}", path.display());
    Ok(key)
}

/// Hash `password`, or prompt for it twice when none was given.
///
/// A confirmation mismatch fails before anything is hashed.
pub fn prepare_password_hash(
    password: Option<&str>,
    prompt: &dyn PasswordPrompt,
) -> Result<String> {
    let hash = match password.filter(|p| !p.is_empty()) {
        Some(password) => hash_password(password)?,
        None => {
            let password = prompt.read_secret("Enter password for autoinstall user")?;
            let confirm = prompt.read_secret("Confirm password")?;
            if password != confirm {
                return Err(anyhow!(BuildError::Validation(
                    "passwords do not match".to_string()
                )));
            }
            hash_password(&password)?
        }
    };

    info!("Password hashed successfully");
    Ok(hash)
}

/// SHA-512 crypt (`$6$salt$hash`) with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    sha512_simple(password, &Sha512Params::default())
        .map_err(|e| anyhow!("Failed to hash password: {:?}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    sha512_check(password, hash).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::build_error;

    #[test]
    fn test_hash_verifies_only_exact_password() {
        let hash = hash_password("Secret123").unwrap();
        assert!(hash.starts_with("$6$"));
        assert!(verify_password("Secret123", &hash));
        assert!(!verify_password("secret123", &hash));
    }

    #[test]
    fn test_salt_is_fresh_per_call() {
        let a = hash_password("Secret123").unwrap();
        let b = hash_password("Secret123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_supplied_password_skips_prompt() {
        let mut prompt = MockPasswordPrompt::new();
        prompt.expect_read_secret().never();

        let hash = prepare_password_hash(Some("Secret123"), &prompt).unwrap();
        assert!(verify_password("Secret123", &hash));
    }

    #[test]
    fn test_prompted_password_is_confirmed() {
        let mut prompt = MockPasswordPrompt::new();
        prompt
            .expect_read_secret()
            .withf(|prompt| prompt == "Enter password for autoinstall user")
            .times(1)
            .returning(|_| Ok("Secret123".to_string()));
        prompt
            .expect_read_secret()
            .withf(|prompt| prompt == "Confirm password")
            .times(1)
            .returning(|_| Ok("Secret123".to_string()));

        let hash = prepare_password_hash(None, &prompt).unwrap();
        assert!(verify_password("Secret123", &hash));
        assert!(!verify_password("secret123", &hash));
    }

    #[test]
    fn test_mismatched_confirmation_is_validation_error() {
        let mut prompt = MockPasswordPrompt::new();
        prompt
            .expect_read_secret()
            .withf(|prompt| prompt == "Enter password for autoinstall user")
            .returning(|_| Ok("Secret123".to_string()));
        prompt
            .expect_read_secret()
            .withf(|prompt| prompt == "Confirm password")
            .returning(|_| Ok("Secret124".to_string()));

        let err = prepare_password_hash(None, &prompt).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Validation(_))));
    }

    #[test]
    fn test_load_ssh_key_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519.pub");
        std::fs::write(&path, "  ssh-ed25519 AAAA... user@host\n\n").unwrap();

        assert_eq!(load_ssh_key(&path).unwrap(), "ssh-ed25519 AAAA... user@host");
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let err = load_ssh_key(Path::new("/nonexistent/id_rsa.pub")).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::NotFound(_))));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pub");
        std::fs::write(&path, "\n").unwrap();

        let err = load_ssh_key(&path).unwrap_err();
        assert!(matches!(build_error(&err), Some(BuildError::Validation(_))));
    }
}
