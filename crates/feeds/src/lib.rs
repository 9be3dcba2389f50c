//! Registry feeds for roadsigns (HTTP and on-disk exports) and the JSON
//! state store, plus the config file that wires them into a
//! [`ReconService`](roadsigns_recon::ReconService).
//!
//! No CLI concepts. Retries are bounded; the service owns the overall
//! per-source deadline.

mod client;
mod file;
mod settings;
mod store;
pub mod wire;

pub use client::{HttpFeed, USER_AGENT};
pub use file::FileFeed;
pub use settings::{AppConfig, FeedMode, FeedSettings};
pub use store::{default_state_path, JsonStateStore};
