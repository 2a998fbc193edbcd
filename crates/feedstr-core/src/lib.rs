pub mod classifier;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod models;
pub mod note_detail;
pub mod nostr;
pub mod pagination;
pub mod persistence;
pub mod profile_resolver;
pub mod store;
pub mod subscription;
pub mod thread;

pub use config::EngineConfig;
pub use engine::FeedEngine;
pub use error::{FeedError, Result};
pub use identity::Identity;
pub use pagination::PageState;
