//! logbridge Dispatch - Producer-side failover
//!
//! Every batch a producer emits is either forwarded to the aggregator,
//! printed locally, or both. Availability is tracked from forward outcomes
//! and a periodic liveness probe; nothing here blocks or fails the caller.

mod availability;
mod context;
mod dispatcher;
#[cfg(test)]
pub mod mock;
mod sink;
mod transport;

pub use availability::{Availability, AvailabilityTracker};
pub use context::ProducerContext;
pub use dispatcher::{DispatchOutcome, FailoverDispatcher};
pub use sink::{LocalSink, StderrSink};
pub use transport::{HttpTransport, Transport};
