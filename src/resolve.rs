//! # Resolution contracts
//! The narrow seam between the scrolling engine and whatever actually talks to
//! remote servers. The engine only ever sees references, pages, and items; the
//! transport, decoding, and timeout policy all live behind [`Resolver`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::item::ItemRef;

/// An opaque pointer to remote content.
///
/// Remote collections may list their entries either as locators or as
/// embedded objects, so both forms are carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Link(String),
    Embedded(serde_json::Value),
}

impl Reference {
    pub fn link(locator: impl Into<String>) -> Self {
        Reference::Link(locator.into())
    }

    /// Best-effort locator: the link itself, or the embedded object's `id`.
    pub fn locator(&self) -> Option<&str> {
        match self {
            Reference::Link(s) => Some(s.as_str()),
            Reference::Embedded(v) => v.get("id").and_then(|id| id.as_str()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locator() {
            Some(loc) => f.write_str(loc),
            None => f.write_str("<embedded object>"),
        }
    }
}

/// Why a single field of a fetched object could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("field `{0}` is not present")]
    Absent(&'static str),
    #[error("field `{field}` is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl FieldError {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldError::Absent(_))
    }
}

/// Failure to turn a reference into an item or a page.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("nothing found at {0}")]
    NotFound(String),
    #[error("fetching {locator} failed: {reason}")]
    Fetch { locator: String, reason: String },
    #[error("{kind} is not a {expected}")]
    WrongType { kind: String, expected: &'static str },
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// One raw page of a remote, page-linked list.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: Option<Reference>,
    pub kind: String,
    pub items: Result<Vec<Reference>, FieldError>,
    pub next: Result<Reference, FieldError>,
    pub size: Option<u64>,
}

/// What an arbitrary reference turned out to be.
pub enum Resolved {
    Item(ItemRef),
    Collection(Page),
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Item(item) => f.debug_tuple("Item").field(&item.name()).finish(),
            Resolved::Collection(page) => f.debug_tuple("Collection").field(&page.kind).finish(),
        }
    }
}

/// External collaborator that fetches and decodes remote objects.
///
/// `source` is a provenance hint: the object the reference was found in.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_item(
        &self,
        reference: &Reference,
        source: Option<&Reference>,
    ) -> Result<ItemRef, ResolveError>;

    async fn resolve_page(
        &self,
        reference: &Reference,
        source: Option<&Reference>,
    ) -> Result<Page, ResolveError>;

    /// Resolve user input whose type is not known up front.
    async fn resolve(&self, reference: &Reference) -> Result<Resolved, ResolveError> {
        match self.resolve_page(reference, None).await {
            Ok(page) => Ok(Resolved::Collection(page)),
            Err(ResolveError::WrongType { .. }) => {
                self.resolve_item(reference, None).await.map(Resolved::Item)
            }
            Err(e) => Err(e),
        }
    }
}
