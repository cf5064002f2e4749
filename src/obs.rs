//! Optional observability helpers for coordinator flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_coordinator.flow` with the `flow`
//!   and `stage` fields, plus events for store outages, fail-open lock grants, and
//!   refresh outcomes.
//! - Enable `metrics` to increment the `token_coordinator_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod events;
mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

pub(crate) use events::*;

// self
use crate::_prelude::*;

/// Coordinator flow kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// `ensure_valid_token` lookups (cache, in-process, or refresh).
	TokenLookup,
	/// Network refresh inside the lock's critical section.
	Refresh,
	/// `execute_authenticated` calls including the one-shot 401 retry.
	Authenticated,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::TokenLookup => "token_lookup",
			FlowKind::Refresh => "refresh",
			FlowKind::Authenticated => "authenticated",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a coordinator helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
