// src/lib.rs
// Public library surface for the demo binary and integration tests.

pub mod config;
pub mod telemetry;
pub mod text;

// Core model
pub mod failure;
pub mod item;
pub mod resolve;
pub mod source;

// Sources
pub mod collection;
pub mod splicer;

// Scroll state
pub mod feed;
pub mod history;
pub mod navigator;
pub mod timeline;

// In-memory resolver for tests and demos
pub mod fixture;

// ---- Re-exports for stable public API ----
pub use crate::collection::{Collection, Deferred};
pub use crate::config::Settings;
pub use crate::failure::Failure;
pub use crate::feed::Feed;
pub use crate::item::{Ancestry, Item, ItemRef, Link};
pub use crate::navigator::{Navigator, NavigatorError};
pub use crate::resolve::{Reference, ResolveError, Resolved, Resolver};
pub use crate::source::{drain, Harvest, PaginatedSource, SourceRef};
pub use crate::splicer::{SpliceInput, Splicer};
pub use crate::timeline::{Relation, Snapshot, Timeline};
