//! Repack an Ubuntu Server live ISO so it installs itself unattended.
//!
//! The pipeline merges an SSH key, a hashed password and a DHCP network
//! stanza into an autoinstall document, copies the source image into a
//! temporary workspace, drops the document in as a NoCloud seed, points the
//! boot menus at it and masters a new hybrid BIOS/EFI image with xorriso.

pub mod config;
pub mod core;
pub mod error;
pub mod iso;
pub mod utils;

pub use config::BuilderConfig;
pub use self::core::{BuildRequest, BuildStage, Builder};
pub use error::BuildError;
