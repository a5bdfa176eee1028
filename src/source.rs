//! # Paginated sources
//! "Give me up to `n` items starting at `p`, plus whatever is left."
//!
//! Implemented directly by [`Collection`](crate::collection::Collection) and by
//! [`Splicer`](crate::splicer::Splicer), so sources nest freely.

use std::fmt;
use std::sync::Arc;

use crate::item::ItemRef;

/// Shared handle to a source. Sources are treated as persistent values.
pub type SourceRef = Arc<dyn PaginatedSource>;

/// The triple returned by [`PaginatedSource::harvest`].
#[derive(Clone, Default)]
pub struct Harvest {
    pub items: Vec<ItemRef>,
    /// The rest of the stream; `None` means exhausted.
    pub continuation: Option<SourceRef>,
    /// Where to resume within `continuation`.
    pub next_starting_point: usize,
}

impl Harvest {
    pub fn exhausted(items: Vec<ItemRef>) -> Self {
        Self {
            items,
            continuation: None,
            next_starting_point: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.continuation.is_none()
    }
}

impl fmt::Debug for Harvest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harvest")
            .field("items", &self.items)
            .field("exhausted", &self.is_exhausted())
            .field("next_starting_point", &self.next_starting_point)
            .finish()
    }
}

/// Anything that yields the next `quantity` items from its own cursor.
///
/// Contract:
/// - at most `quantity` items come back;
/// - fetch problems show up as failure items inside `items`, never as an error;
/// - the receiver is not observably changed, so the same value may be
///   harvested concurrently and repeatedly.
#[async_trait::async_trait]
pub trait PaginatedSource: Send + Sync {
    async fn harvest(&self, quantity: usize, starting_point: usize) -> Harvest;
}

/// Drain a source completely, `chunk` items at a time.
///
/// Only meant for finite sources; mostly useful in tests and tooling.
pub async fn drain(source: SourceRef, chunk: usize) -> Vec<ItemRef> {
    let chunk = chunk.max(1);
    let mut out = Vec::new();
    let mut cursor = Some((source, 0usize));
    while let Some((src, at)) = cursor.take() {
        let h = src.harvest(chunk, at).await;
        out.extend(h.items);
        cursor = h.continuation.map(|next| (next, h.next_starting_point));
    }
    out
}
