use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use autoiso::config::{self, validation::validate_config_structure, BuilderConfig};
use autoiso::error::build_error;
use autoiso::utils::Interrupt;
use autoiso::{BuildError, BuildRequest, Builder};

mod cli;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("autoiso={},warn", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("autoiso v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = Interrupt::process().install() {
        error!("✗ {:#}", e);
        std::process::exit(1);
    }

    match run(cli) {
        Ok(output) => {
            println!(
                "{} Autoinstall ISO created: {}",
                style("✓").green().bold(),
                style(output.display()).bold()
            );
        }
        Err(e) => {
            error!("✗ Build failed: {:#}", e);
            let code = match build_error(&e) {
                Some(BuildError::Interrupted) => 130,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> Result<PathBuf> {
    let builder_config = resolve_config(&cli)?;

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let request = BuildRequest {
        source_iso: absolute(&cwd, &cli.source_iso),
        autoinstall_yaml: absolute(&cwd, &cli.autoinstall_yaml),
        ssh_key: absolute(&cwd, &cli.ssh_key),
        password: cli.password,
        output_iso: absolute(&cwd, &cli.output_iso),
        source_sha256: cli.source_sha256,
        write_checksum: cli.checksum,
    };

    Builder::new(builder_config).build(&request)
}

/// Config file (or defaults) with command-line overrides applied
fn resolve_config(cli: &Cli) -> Result<BuilderConfig> {
    let mut builder_config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => BuilderConfig::default(),
    };

    if let Some(method) = cli.extract_with {
        builder_config.extraction = method;
    }
    if let Some(label) = &cli.volume_label {
        builder_config.volume_label = label.clone();
    }

    validate_config_structure(&builder_config).context("Invalid command-line overrides")?;
    Ok(builder_config)
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf().clean()
    } else {
        cwd.join(path).clean()
    }
}
