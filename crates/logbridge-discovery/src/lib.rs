//! logbridge Discovery - Locating a running aggregator
//!
//! The aggregator advertises itself with a small JSON record written
//! atomically to its working directory. Producers search for that record from
//! their own working directory upwards and ignore records that are stale or
//! whose process is gone.

mod process;
mod publisher;
mod resolver;

pub use process::is_process_alive;
pub use publisher::{read_record, write_record, DiscoveryPublisher};
pub use resolver::{DiscoveryResolver, ResolveSource, Resolved};
