//! Secondary-store fan-out for the casegraph pipeline.
//!
//! After the primary write commits, [`FanoutCoordinator`] pushes the same
//! logical record to every configured secondary backend, records an
//! explicit per-backend outcome, and hands failures to the durable retry
//! queue. [`RetryReplayer`] drains that queue out of band.

pub mod backends;
pub mod config;
pub mod coordinator;
pub mod pipeline;
pub mod replayer;
pub mod snapshot;

#[cfg(test)]
mod testutil;

pub use coordinator::{FanoutConfig, FanoutCoordinator};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use replayer::{ReplayConfig, ReplayStats, RetryReplayer};
pub use snapshot::{RetryContext, RetryEnvelope, build_snapshot};
