//! # Items
//! Anything that can sit on the timeline: a post, a profile, or a
//! [`Failure`](crate::failure::Failure) standing in for either.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::source::SourceRef;

/// Shared handle to an item. Items are immutable once built.
pub type ItemRef = Arc<dyn Item>;

/// A numbered link an item exposes for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub locator: String,
    pub media_type: Option<String>,
}

/// Result of walking up an item's ancestor chain.
#[derive(Clone, Default)]
pub struct Ancestry {
    /// Nearest ancestor first.
    pub items: Vec<ItemRef>,
    /// Where to resume walking; `None` once the chain has ended or failed.
    pub frontier: Option<ItemRef>,
}

impl Ancestry {
    pub fn ended() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Ancestry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestry")
            .field("items", &self.items.len())
            .field("frontier", &self.frontier.as_ref().map(|i| i.name()))
            .finish()
    }
}

/// One renderable unit of content.
///
/// Renderers never fail: any internal problem must come back as inline text.
#[async_trait::async_trait]
pub trait Item: Send + Sync {
    /// Short human-facing label (author handle, title, ...).
    fn name(&self) -> String;

    /// Publication time; `None` sorts as oldest when merging.
    fn timestamp(&self) -> Option<DateTime<Utc>>;

    /// Long form, for the item under the cursor.
    fn render(&self, width: usize) -> String;

    /// Short form, for surrounding items.
    fn preview(&self, width: usize) -> String;

    /// Up to `quantity` ancestors, nearest first.
    async fn parents(&self, quantity: usize) -> Ancestry;

    /// The item's own paginated children (replies, an actor's posts, ...).
    fn children(&self) -> Option<SourceRef>;

    fn select_link(&self, index: usize) -> Option<Link>;

    fn is_failure(&self) -> bool {
        false
    }
}

impl fmt::Debug for dyn Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("name", &self.name())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}
