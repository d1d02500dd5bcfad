pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod providers;
pub mod record;
pub mod reply;
pub mod server;
pub mod transport;

pub use reply::{NormalizedReply, Rr};
