//! Provider-facing descriptor (data) and strategy (behavior).
//!
//! `descriptor` holds the validated token endpoint and client authentication preference
//! for the single upstream account. `strategy` defines [`ProviderStrategy`], the hook
//! that decorates refresh requests and classifies token endpoint failures.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
