//! # Navigator
//! Opens pages (timelines) from user input and keeps the back/forward stack.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::collection::Collection;
use crate::config::Settings;
use crate::failure::Failure;
use crate::history::History;
use crate::item::{ItemRef, Link};
use crate::resolve::{Reference, Resolved, Resolver};
use crate::source::SourceRef;
use crate::splicer::Splicer;
use crate::timeline::Timeline;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigatorError {
    #[error("{0} is not a known feed")]
    UnknownFeed(String),
    #[error("unrecognized subcommand: {0}")]
    UnknownCommand(String),
    #[error("no page is open")]
    NothingOpen,
}

pub struct Navigator {
    resolver: Arc<dyn Resolver>,
    settings: Settings,
    history: History<Arc<Timeline>>,
}

impl Navigator {
    pub fn new(resolver: Arc<dyn Resolver>, settings: Settings) -> Self {
        Self {
            resolver,
            settings,
            history: History::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The page currently shown.
    pub fn current(&self) -> Option<&Arc<Timeline>> {
        self.history.current()
    }

    pub fn back(&mut self) -> Option<&Arc<Timeline>> {
        self.history.back()
    }

    pub fn forward(&mut self) -> Option<&Arc<Timeline>> {
        self.history.forward()
    }

    /// `open <input>` or `feed <name>`.
    pub async fn subcommand(
        &mut self,
        name: &str,
        argument: &str,
    ) -> Result<Arc<Timeline>, NavigatorError> {
        match name {
            "open" => Ok(self.open(&Reference::link(argument)).await),
            "feed" => self.open_feed(argument).await,
            other => Err(NavigatorError::UnknownCommand(other.to_string())),
        }
    }

    /// Open whatever `reference` points at. A collection becomes a flat page,
    /// anything else a thread centered on it; failures open as a failure page.
    pub async fn open(&mut self, reference: &Reference) -> Arc<Timeline> {
        info!(target: "navigator", input = %reference, "opening");
        match self.resolver.resolve(reference).await {
            Ok(Resolved::Item(item)) => self.show_item(item),
            Ok(Resolved::Collection(page)) => {
                let c = Collection::from_page(page, self.resolver.clone(), &self.settings);
                self.show_source(Arc::new(c)).await
            }
            Err(e) => {
                warn!(target: "navigator", input = %reference, error = %e, "open failed");
                self.show_item(Failure::item(
                    anyhow::Error::new(e).context(format!("opening {reference}")),
                ))
            }
        }
    }

    /// Splice the inputs of a configured feed into one page.
    pub async fn open_feed(&mut self, name: &str) -> Result<Arc<Timeline>, NavigatorError> {
        let inputs = self
            .settings
            .feeds
            .get(name)
            .ok_or_else(|| NavigatorError::UnknownFeed(name.to_string()))?;
        let references: Vec<Reference> =
            inputs.iter().map(|s| Reference::link(s.as_str())).collect();
        info!(target: "navigator", feed = name, inputs = references.len(), "opening feed");
        let splicer = Splicer::open(&references, self.resolver.clone(), &self.settings).await;
        Ok(self.show_source(Arc::new(splicer)).await)
    }

    /// Open the item under the cursor as its own thread.
    pub fn open_current(&mut self) -> Result<Arc<Timeline>, NavigatorError> {
        let item = self
            .current()
            .and_then(|t| t.current())
            .ok_or(NavigatorError::NothingOpen)?;
        Ok(self.show_item(item))
    }

    /// The `index`th link of the item under the cursor (1-based).
    pub fn link(&self, index: usize) -> Option<Link> {
        self.current()?.select_link(index)
    }

    /// Follow the `index`th link of the current item inside the client.
    pub async fn open_link(&mut self, index: usize) -> Option<Arc<Timeline>> {
        let link = self.link(index)?;
        Some(self.open(&Reference::link(link.locator)).await)
    }

    fn show_item(&mut self, item: ItemRef) -> Arc<Timeline> {
        let timeline = Timeline::from_item(item, &self.settings);
        self.push(timeline)
    }

    async fn show_source(&mut self, source: SourceRef) -> Arc<Timeline> {
        let timeline = Timeline::from_source(source, &self.settings).await;
        self.push(timeline)
    }

    fn push(&mut self, timeline: Arc<Timeline>) -> Arc<Timeline> {
        timeline.top_up();
        self.history.add(timeline.clone());
        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, MemoryResolver};
    use serde_json::json;

    fn fixture_world() -> MemoryResolver {
        let r = MemoryResolver::new();
        r.insert(fixture::note("root", &fixture::minutes(1), "root"));
        r.insert(json!({
            "id": "post", "type": "Note", "published": fixture::minutes(2),
            "content": "see link", "inReplyTo": "root", "url": "root"
        }));
        r.insert(fixture::page("list", &["post", "root"], None));
        r
    }

    fn settings() -> Settings {
        Settings::from_toml_str(
            r#"
            [network]
            preload_amount = 2

            [feeds]
            home = ["list", "missing"]
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn open_item_centers_on_it() {
        let r = fixture_world();
        let mut nav = Navigator::new(r.shared(), settings());
        let t = nav.open(&Reference::link("post")).await;
        t.settle().await;
        assert_eq!(t.current().unwrap().name(), "post");
        assert!(t.with_feed(|f| f.contains(-1)));
    }

    #[tokio::test]
    async fn open_collection_lists_it() {
        let r = fixture_world();
        let mut nav = Navigator::new(r.shared(), settings());
        let t = nav.open(&Reference::link("list")).await;
        assert_eq!(t.current().unwrap().name(), "post");
        assert!(t.with_feed(|f| f.contains(1)));
    }

    #[tokio::test]
    async fn open_failure_shows_failure_page() {
        let r = fixture_world();
        let mut nav = Navigator::new(r.shared(), settings());
        let t = nav.open(&Reference::link("nowhere")).await;
        assert!(t.current().unwrap().is_failure());
    }

    #[tokio::test]
    async fn feeds_come_from_settings() {
        let r = fixture_world();
        let mut nav = Navigator::new(r.shared(), settings());
        assert_eq!(
            nav.open_feed("work").await.err(),
            Some(NavigatorError::UnknownFeed("work".into()))
        );
        let t = nav.open_feed("home").await.unwrap();
        t.settle().await;
        let names: Vec<String> = t.snapshot(5).entries.iter().map(|e| e.item.name()).collect();
        assert_eq!(names[..2], ["post".to_string(), "root".to_string()]);
        assert!(t.with_feed(|f| f.try_get(2).map(|i| i.is_failure()).unwrap_or(false)));
    }

    #[tokio::test]
    async fn history_tracks_opened_pages() {
        let r = fixture_world();
        let mut nav = Navigator::new(r.shared(), settings());
        assert_eq!(nav.open_current().err(), Some(NavigatorError::NothingOpen));

        let list = nav.open(&Reference::link("list")).await;
        let thread = nav.open_current().unwrap();
        assert_eq!(thread.current().unwrap().name(), "post");

        let followed = nav.open_link(1).await.expect("post links to root");
        assert_eq!(followed.current().unwrap().name(), "root");
        assert!(nav.open_link(2).await.is_none());

        nav.back();
        assert!(Arc::ptr_eq(nav.back().unwrap(), &list));
        assert!(Arc::ptr_eq(nav.forward().unwrap(), &thread));
        assert!(matches!(
            nav.subcommand("frobnicate", "x").await,
            Err(NavigatorError::UnknownCommand(_))
        ));
    }
}
