//! Background expiry sweep transitioning overdue leases and retrying revocations.

// self
use crate::{
	_prelude::*,
	audit::{AuditAction, AuditEvent, AuditOutcome},
	lease::LeaseManager,
	obs::{self, StageKind, StageOutcome},
};

/// Counters describing one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Leases transitioned to Expired during this pass.
	pub expired: usize,
	/// Source-side revocations that completed during this pass.
	pub revoked_at_source: usize,
	/// Revocations still pending after this pass.
	pub revocations_pending: usize,
}

/// Periodic scanner over the lease table.
///
/// Each pass marks overdue leases Expired under the table lock, then performs
/// the source-side revocations (including retries queued by earlier failures)
/// outside of it. The loop itself is runtime-agnostic; the host supplies the
/// sleep primitive.
#[derive(Debug)]
pub struct ExpirySweep {
	manager: Arc<LeaseManager>,
	interval: Duration,
}
impl ExpirySweep {
	/// Default scan interval between passes.
	pub const DEFAULT_INTERVAL: Duration = Duration::minutes(1);

	/// Creates a sweep over the provided manager with the default interval.
	pub fn new(manager: Arc<LeaseManager>) -> Self {
		Self { manager, interval: Self::DEFAULT_INTERVAL }
	}

	/// Overrides the scan interval.
	pub fn with_interval(mut self, interval: Duration) -> Self {
		self.interval = interval;

		self
	}

	/// Configured scan interval.
	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Runs a single pass against the current clock.
	pub async fn run_once(&self) -> SweepReport {
		self.sweep_at(OffsetDateTime::now_utc()).await
	}

	/// Runs a single pass, treating `now` as the current instant.
	pub async fn sweep_at(&self, now: OffsetDateTime) -> SweepReport {
		const KIND: StageKind = StageKind::Sweep;

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		let expired = self.manager.expire_overdue(now);

		for (id, _) in &expired {
			self.manager.audit().append(
				AuditEvent::new(AuditAction::Expire, AuditOutcome::Success).with_lease(id.clone()),
			);
		}

		let mut work = self.manager.take_pending_revocations();
		let expired_count = expired.len();

		work.extend(expired);

		let mut revoked_at_source = 0;
		let mut revocations_pending = 0;

		for (id, reference) in work {
			match self.manager.source().revoke_credential(&reference).await {
				Ok(()) => {
					revoked_at_source += 1;
					self.manager.audit().append(
						AuditEvent::new(AuditAction::Revoke, AuditOutcome::Success)
							.with_lease(id)
							.with_stage("sweep"),
					);
				},
				Err(_) => {
					revocations_pending += 1;
					self.manager.queue_revocation(id, reference);
				},
			}
		}

		obs::record_stage_outcome(KIND, StageOutcome::Success);

		SweepReport { expired: expired_count, revoked_at_source, revocations_pending }
	}

	/// Drives the sweep forever with a host-supplied sleep primitive.
	///
	/// ```ignore
	/// tokio::spawn(async move { sweep.run(|interval| tokio::time::sleep(interval.unsigned_abs())).await });
	/// ```
	pub async fn run<S, F>(&self, mut sleep: S)
	where
		S: FnMut(Duration) -> F,
		F: Future<Output = ()>,
	{
		loop {
			sleep(self.interval).await;
			self.run_once().await;
		}
	}
}
