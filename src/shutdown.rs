//! Cooperative cancellation on Ctrl+C / SIGTERM

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Exit code used when a run stops because of a signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared flag telling workers to stop starting new work.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Route Ctrl+C / SIGTERM to this token.
    ///
    /// The first signal only sets the flag so that in-flight trials can be
    /// recorded; a second signal exits immediately.
    fn install_handler(&self) -> Result<()> {
        let cancelled = Arc::clone(&self.cancelled);
        ctrlc::set_handler(move || {
            if cancelled.swap(true, Ordering::SeqCst) {
                eprintln!("Interrupted again, exiting");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            eprintln!("Interrupt received, finishing running work (press Ctrl+C again to abort)");
        })
        .context("Failed to set Ctrl+C handler")
    }
}

static PROCESS_TOKEN: Mutex<Option<CancelToken>> = Mutex::new(None);

/// The token fed by Ctrl+C / SIGTERM for this process.
///
/// Only one signal handler can be installed per process; it is installed on
/// the first call and every later call returns the same token.
pub fn process_token() -> Result<CancelToken> {
    let mut slot = PROCESS_TOKEN.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = slot.as_ref() {
        return Ok(token.clone());
    }
    let token = CancelToken::new();
    token.install_handler()?;
    *slot = Some(token.clone());
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_process_token_is_shared() {
        let first = process_token().unwrap();
        let second = process_token().unwrap();
        assert!(Arc::ptr_eq(&first.cancelled, &second.cancelled));
    }
}
