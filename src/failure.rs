//! # Failure
//! A degenerate item wrapping an error, placed wherever real content failed
//! to materialize so that merging and windowing never branch on errors.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::item::{Ancestry, Item, ItemRef, Link};
use crate::source::SourceRef;
use crate::text::{squash, truncate};

const PROBLEM_STYLE: &str = "\x1b[1;31m";
const RESET_STYLE: &str = "\x1b[0m";

#[derive(Debug)]
pub struct Failure {
    error: anyhow::Error,
}

impl Failure {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Build a failure from a plain message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self {
            error: anyhow::anyhow!("{message}"),
        }
    }

    /// Wrap straight into a shared item handle.
    pub fn item(error: impl Into<anyhow::Error>) -> ItemRef {
        Arc::new(Self::new(error))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// The error chain on a single line.
    pub fn message(&self) -> String {
        let raw = format!("{:#}", self.error);
        let squashed = squash(&raw);
        if squashed.is_empty() {
            "unknown error".to_string()
        } else {
            squashed
        }
    }

    fn styled(&self, width: usize) -> String {
        let text = truncate(&format!("⚠ {}", self.message()), width);
        format!("{PROBLEM_STYLE}{text}{RESET_STYLE}")
    }
}

#[async_trait::async_trait]
impl Item for Failure {
    fn name(&self) -> String {
        self.message()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn render(&self, width: usize) -> String {
        self.styled(width)
    }

    fn preview(&self, width: usize) -> String {
        self.styled(width)
    }

    async fn parents(&self, _quantity: usize) -> Ancestry {
        Ancestry::ended()
    }

    fn children(&self) -> Option<SourceRef> {
        None
    }

    fn select_link(&self, _index: usize) -> Option<Link> {
        None
    }

    fn is_failure(&self) -> bool {
        true
    }
}
