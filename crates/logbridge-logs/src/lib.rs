//! logbridge Logs - Durable append-only session store
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/current                 relative path of the active session
//! <base>/sessions/<name>/logs.jsonl
//! ```

mod reader;
mod rotation;
mod session;
mod writer;

pub use reader::{follow, read, ReadOptions, ReadResult};
pub use rotation::{prune_backups, rotate, rotated_path, RotationConfig};
pub use session::{current_session, ensure_session, SessionPaths};
pub use writer::{append, truncate_message, SessionLog};
