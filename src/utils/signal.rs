use anyhow::{anyhow, Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::error::BuildError;

static PROCESS_INTERRUPT: OnceLock<Interrupt> = OnceLock::new();

/// Records SIGINT/SIGTERM instead of letting them kill the process.
///
/// The foreground tool receives the terminal's signal itself and exits, so
/// the build unwinds through its normal error path and cleans up.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag shared by the whole process, the one `install` hooks up
    pub fn process() -> Self {
        PROCESS_INTERRUPT.get_or_init(Interrupt::new).clone()
    }

    /// Replace the default terminate action of SIGINT and SIGTERM
    pub fn install(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .with_context(|| format!("Failed to register handler for signal {}", signal))?;
        }
        debug!("Interrupt handlers installed");
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `BuildError::Interrupted` once a signal has arrived
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            warn!("Interrupt received, stopping build");
            return Err(anyhow!(BuildError::Interrupted));
        }
        Ok(())
    }
}
