//! Cooperative cancellation shared between the Ctrl-C handler and pipeline stages

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	/// Flag that is set when the process receives Ctrl-C
	pub fn on_interrupt() -> Self {
		let flag = Self::new();
		let handle = flag.clone();
		if let Err(e) = ctrlc::set_handler(move || {
			if handle.is_cancelled() {
				std::process::exit(130);
			}
			handle.cancel();
			crate::ui::warn("Interrupted, finishing current step (press Ctrl-C again to abort)");
		}) {
			tracing::warn!(error = %e, "could not install Ctrl-C handler");
		}
		flag
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Consulted by long stages between units of work (one query, one batch, one summary)
#[derive(Clone, Default)]
pub struct Checkpoint<'a> {
	cancel: CancelFlag,
	keepalive: Option<&'a (dyn Fn() -> Result<()> + Sync)>,
}

impl<'a> Checkpoint<'a> {
	pub fn new(cancel: CancelFlag) -> Self {
		Self { cancel, keepalive: None }
	}

	/// Run `keepalive` at every checkpoint, typically a run-lock heartbeat
	pub fn with_keepalive(mut self, keepalive: &'a (dyn Fn() -> Result<()> + Sync)) -> Self {
		self.keepalive = Some(keepalive);
		self
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// `Ok(false)` once cancelled. A failing keepalive is returned as the stage error.
	pub fn proceed(&self) -> Result<bool> {
		if self.cancel.is_cancelled() {
			return Ok(false);
		}
		if let Some(keepalive) = self.keepalive {
			keepalive()?;
		}
		Ok(true)
	}
}
