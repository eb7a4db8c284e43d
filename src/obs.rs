//! Optional observability helpers for broker stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `sts_broker.stage` with the `stage`
//!   (operation) and `step` (call site) fields.
//! - Enable `metrics` to increment the `sts_broker_stage_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
	/// End-to-end token-for-credential exchange.
	Exchange,
	/// Lease issuance.
	Issue,
	/// Lease renewal.
	Renew,
	/// Lease revocation.
	Revoke,
	/// Expiry sweep pass.
	Sweep,
}
impl StageKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageKind::Exchange => "exchange",
			StageKind::Issue => "issue",
			StageKind::Renew => "renew",
			StageKind::Revoke => "revoke",
			StageKind::Sweep => "sweep",
		}
	}
}
impl Display for StageKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
