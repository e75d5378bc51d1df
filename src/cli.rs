use clap::Parser;
use std::path::PathBuf;

use autoiso::config::ExtractionMethod;

pub const DEFAULT_OUTPUT: &str = "autoinstall-server.iso";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "autoiso")]
pub struct Cli {
    /// Source Ubuntu Server live ISO
    pub source_iso: PathBuf,

    /// Base autoinstall YAML document
    pub autoinstall_yaml: PathBuf,

    /// Output path for the generated ISO
    #[arg(default_value = DEFAULT_OUTPUT)]
    pub output_iso: PathBuf,

    /// Public key file installed as the only authorized key
    #[arg(long)]
    pub ssh_key: PathBuf,

    /// Plaintext password for the installed user (prompted for when omitted)
    #[arg(long, env = "AUTOISO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// JSON builder configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How to copy the source image contents out
    #[arg(long, value_enum)]
    pub extract_with: Option<ExtractionMethod>,

    /// Volume label of the generated ISO
    #[arg(long)]
    pub volume_label: Option<String>,

    /// Expected SHA-256 of the source ISO
    #[arg(long)]
    pub source_sha256: Option<String>,

    /// Write <output>.sha256 next to the generated ISO
    #[arg(long)]
    pub checksum: bool,

    #[arg(short, long)]
    pub verbose: bool,
}
