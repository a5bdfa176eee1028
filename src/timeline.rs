//! # Timeline
//! One on-screen page: a [`Feed`] plus what it takes to grow it in both
//! directions, all behind a single lock.
//!
//! Growth happens off the render path. When the cursor gets within
//! `preload_amount` of either edge, a tokio task fetches more (ancestors above,
//! the next harvest below) without holding the lock, then takes the lock once
//! to merge. Readers only ever wait for that merge, never for the network.

use futures::FutureExt;
use metrics::counter;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::failure::Failure;
use crate::feed::Feed;
use crate::item::{Ancestry, ItemRef, Link};
use crate::source::{Harvest, SourceRef};
use crate::telemetry::ensure_metrics_described;

/// How an entry relates to the item the page was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Parent,
    Origin,
    Child,
}

#[derive(Debug, Clone)]
pub struct Entry {
    /// Relative to the cursor.
    pub offset: isize,
    pub relation: Relation,
    pub item: ItemRef,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
    pub loading_up: bool,
    pub loading_down: bool,
}

impl Snapshot {
    pub fn current(&self) -> Option<&Entry> {
        self.entries.iter().find(|e| e.offset == 0)
    }
}

struct State {
    feed: Feed,
    /// Where to continue walking ancestors from.
    frontier: Option<ItemRef>,
    loading_up: bool,
    /// Where to continue harvesting children from.
    below: Option<SourceRef>,
    basepoint: usize,
    loading_down: bool,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Timeline {
    state: Mutex<State>,
    preload: usize,
    changed: Notify,
}

impl Timeline {
    fn with_state(
        feed: Feed,
        frontier: Option<ItemRef>,
        below: Option<SourceRef>,
        basepoint: usize,
        settings: &Settings,
    ) -> Arc<Self> {
        ensure_metrics_described();
        Arc::new(Self {
            state: Mutex::new(State {
                feed,
                frontier,
                loading_up: false,
                below,
                basepoint,
                loading_down: false,
                tasks: Vec::new(),
            }),
            preload: settings.preload_amount().max(1),
            changed: Notify::new(),
        })
    }

    /// A page centered on `item`: ancestors above, its children below.
    pub fn from_item(item: ItemRef, settings: &Settings) -> Arc<Self> {
        let below = item.children();
        Self::with_state(Feed::new(item.clone()), Some(item), below, 0, settings)
    }

    /// A flat page of unrelated items, nothing to load in either direction.
    pub fn from_items(items: Vec<ItemRef>, settings: &Settings) -> Arc<Self> {
        Self::with_state(Feed::from_items(items), None, None, 0, settings)
    }

    /// A page over a source, pre-filled with its first `preload_amount` items.
    pub async fn from_source(source: SourceRef, settings: &Settings) -> Arc<Self> {
        let h = source.harvest(settings.preload_amount().max(1), 0).await;
        Self::with_state(
            Feed::from_items(h.items),
            None,
            h.continuation,
            h.next_starting_point,
            settings,
        )
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("timeline mutex poisoned")
    }

    pub fn current(&self) -> Option<ItemRef> {
        self.lock().feed.try_get(0).cloned()
    }

    pub fn select_link(&self, index: usize) -> Option<Link> {
        self.current()?.select_link(index)
    }

    /// Entries within `context` of the cursor, plus loading flags.
    pub fn snapshot(&self, context: usize) -> Snapshot {
        let st = self.lock();
        let entries = st
            .feed
            .window(context)
            .map(|(offset, item)| Entry {
                offset,
                relation: if st.feed.is_parent(offset) {
                    Relation::Parent
                } else if st.feed.is_child(offset) {
                    Relation::Child
                } else {
                    Relation::Origin
                },
                item: item.clone(),
            })
            .collect();
        Snapshot {
            entries,
            loading_up: st.loading_up,
            loading_down: st.loading_down,
        }
    }

    /// Exclusive populated bounds relative to the cursor.
    pub fn bounds(&self) -> (isize, isize) {
        self.lock().feed.bounds()
    }

    /// Run `f` against the feed under the lock.
    pub fn with_feed<R>(&self, f: impl FnOnce(&Feed) -> R) -> R {
        f(&self.lock().feed)
    }

    pub fn move_up(self: &Arc<Self>) -> bool {
        let moved = self.lock().feed.move_up();
        self.top_up();
        moved
    }

    pub fn move_down(self: &Arc<Self>) -> bool {
        let moved = self.lock().feed.move_down();
        self.top_up();
        moved
    }

    pub fn move_to_center(&self) -> bool {
        self.lock().feed.move_to_center()
    }

    /// Start background loads for whichever edge is within reach of the
    /// cursor. Must be called from inside a tokio runtime.
    ///
    /// A load that panics is merged as a failure item and ends that
    /// direction, so the loading flag never sticks.
    pub fn top_up(self: &Arc<Self>) {
        let preload = self.preload as isize;
        let mut st = self.lock();
        st.tasks.retain(|t| !t.is_finished());

        if !st.loading_up && !st.feed.contains(-preload) {
            if let Some(frontier) = st.frontier.clone() {
                st.loading_up = true;
                let this = Arc::clone(self);
                let n = self.preload;
                debug!(target: "timeline", quantity = n, "loading ancestors");
                st.tasks.push(tokio::spawn(async move {
                    let load = AssertUnwindSafe(frontier.parents(n));
                    let ancestry = match load.catch_unwind().await {
                        Ok(ancestry) => ancestry,
                        Err(_) => {
                            warn!(target: "timeline", "ancestor load panicked");
                            let failure = anyhow::anyhow!("loading ancestors panicked");
                            Ancestry {
                                items: vec![Failure::item(failure)],
                                frontier: None,
                            }
                        }
                    };
                    this.merge_up(ancestry);
                }));
            }
        }

        if !st.loading_down && !st.feed.contains(preload) {
            if let Some(below) = st.below.clone() {
                st.loading_down = true;
                let this = Arc::clone(self);
                let (n, basepoint) = (self.preload, st.basepoint);
                debug!(target: "timeline", quantity = n, basepoint, "loading children");
                st.tasks.push(tokio::spawn(async move {
                    let load = AssertUnwindSafe(below.harvest(n, basepoint));
                    let harvest = match load.catch_unwind().await {
                        Ok(harvest) => harvest,
                        Err(_) => {
                            warn!(target: "timeline", basepoint, "child load panicked");
                            Harvest::exhausted(vec![Failure::item(anyhow::anyhow!(
                                "loading more items panicked"
                            ))])
                        }
                    };
                    this.merge_down(harvest);
                }));
            }
        }
    }

    fn merge_up(&self, ancestry: Ancestry) {
        {
            let mut st = self.lock();
            info!(
                target: "timeline",
                added = ancestry.items.len(),
                more = ancestry.frontier.is_some(),
                "ancestors merged"
            );
            st.feed.prepend(ancestry.items);
            st.frontier = ancestry.frontier;
            st.loading_up = false;
        }
        counter!("timeline_topups_total").increment(1);
        self.changed.notify_one();
    }

    fn merge_down(&self, harvest: Harvest) {
        {
            let mut st = self.lock();
            info!(
                target: "timeline",
                added = harvest.items.len(),
                exhausted = harvest.is_exhausted(),
                "children merged"
            );
            st.feed.append(harvest.items);
            st.below = harvest.continuation;
            st.basepoint = harvest.next_starting_point;
            st.loading_down = false;
        }
        counter!("timeline_topups_total").increment(1);
        self.changed.notify_one();
    }

    /// Wait until background loads started so far have been merged.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut self.lock().tasks);
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(target: "timeline", error = %e, "top-up task died");
                }
            }
        }
    }

    /// Resolves after the next background merge; for redraw loops.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, MemoryResolver};
    use crate::item::Item;
    use crate::resolve::{Reference, Resolver};
    use crate::source::PaginatedSource;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::time::Duration;

    fn settings(preload: usize) -> Settings {
        Settings::from_toml_str(&format!("[network]\npreload_amount = {preload}\n")).unwrap()
    }

    /// root <- mid <- leaf, where leaf has replies r1..r4 over two pages.
    fn thread() -> MemoryResolver {
        let r = MemoryResolver::new();
        r.insert(fixture::note("root", &fixture::minutes(1), "root"));
        r.insert(fixture::reply("mid", &fixture::minutes(2), "mid", "root"));
        r.insert(json!({
            "id": "leaf", "type": "Note", "published": fixture::minutes(3),
            "content": "leaf", "inReplyTo": "mid", "replies": "replies-1"
        }));
        for (i, id) in ["r1", "r2", "r3", "r4"].iter().enumerate() {
            r.insert(fixture::reply(id, &fixture::minutes(10 + i as i64), id, "leaf"));
        }
        r.insert(fixture::page("replies-1", &["r1", "r2"], Some("replies-2")));
        r.insert(fixture::page("replies-2", &["r3", "r4"], None));
        r
    }

    fn names(s: &Snapshot) -> Vec<(isize, String)> {
        s.entries.iter().map(|e| (e.offset, e.item.name())).collect()
    }

    #[tokio::test]
    async fn item_page_loads_both_directions() {
        let r = thread();
        let leaf = r.resolve_item(&Reference::link("leaf"), None).await.unwrap();
        let t = Timeline::from_item(leaf, &settings(2));
        t.top_up();
        t.settle().await;

        let snap = t.snapshot(2);
        assert_eq!(
            names(&snap),
            vec![
                (-2, "root".to_string()),
                (-1, "mid".to_string()),
                (0, "leaf".to_string()),
                (1, "r1".to_string()),
                (2, "r2".to_string()),
            ]
        );
        assert_eq!(snap.entries[0].relation, Relation::Parent);
        assert_eq!(snap.current().map(|e| e.relation), Some(Relation::Origin));
        assert_eq!(snap.entries[4].relation, Relation::Child);
        assert!(!snap.loading_up && !snap.loading_down);
    }

    #[tokio::test]
    async fn scrolling_pulls_in_later_pages() {
        let r = thread();
        let leaf = r.resolve_item(&Reference::link("leaf"), None).await.unwrap();
        let t = Timeline::from_item(leaf, &settings(2));
        t.top_up();
        t.settle().await;

        assert!(t.move_down());
        t.settle().await;
        assert!(t.move_down());
        t.settle().await;
        let (_, upper) = t.bounds();
        assert_eq!(upper, 3, "r3 and r4 loaded below r2");
        assert_eq!(t.current().unwrap().name(), "r2");

        // nothing left anywhere: further moves stop at the edge
        assert!(t.move_down());
        assert!(t.move_down());
        assert!(!t.move_down());
        t.settle().await;
        assert_eq!(t.current().unwrap().name(), "r4");
        assert!(t.move_to_center());
        assert_eq!(t.current().unwrap().name(), "leaf");
    }

    #[tokio::test]
    async fn source_page_starts_prefilled() {
        let r = thread();
        let replies: SourceRef = Arc::new(crate::collection::Deferred::new(
            Reference::link("replies-1"),
            None,
            r.shared(),
            &Settings::default(),
        ));
        let t = Timeline::from_source(replies, &settings(3)).await;
        assert_eq!(t.current().unwrap().name(), "r1");
        assert!(t.with_feed(|f| f.contains(2)));
        t.top_up();
        t.settle().await;
        assert!(t.with_feed(|f| f.contains(3)));
        assert!(t.select_link(1).is_none());
    }

    #[tokio::test]
    async fn changed_fires_after_merge() {
        let r = thread();
        let leaf = r.resolve_item(&Reference::link("leaf"), None).await.unwrap();
        let t = Timeline::from_item(leaf, &settings(1));
        t.top_up();
        t.changed().await;
        t.settle().await;
        assert!(t.with_feed(|f| f.contains(-1) && f.contains(1)));
    }

    /// An item whose ancestors and children both blow up when loaded.
    struct Explosive;

    struct ExplosiveSource;

    #[async_trait::async_trait]
    impl PaginatedSource for ExplosiveSource {
        async fn harvest(&self, _quantity: usize, _starting_point: usize) -> Harvest {
            panic!("harvest exploded")
        }
    }

    #[async_trait::async_trait]
    impl Item for Explosive {
        fn name(&self) -> String {
            "explosive".into()
        }
        fn timestamp(&self) -> Option<DateTime<Utc>> {
            None
        }
        fn render(&self, _width: usize) -> String {
            "explosive".into()
        }
        fn preview(&self, _width: usize) -> String {
            "explosive".into()
        }
        async fn parents(&self, _quantity: usize) -> Ancestry {
            panic!("parents exploded")
        }
        fn children(&self) -> Option<SourceRef> {
            Some(Arc::new(ExplosiveSource))
        }
        fn select_link(&self, _index: usize) -> Option<Link> {
            None
        }
    }

    #[tokio::test]
    async fn panicking_loads_surface_as_failures() {
        let t = Timeline::from_item(Arc::new(Explosive), &settings(2));
        t.top_up();
        t.settle().await;

        let snap = t.snapshot(2);
        assert!(!snap.loading_up && !snap.loading_down);
        assert!(t.with_feed(|f| f.get(-1).is_failure() && f.get(1).is_failure()));

        // both directions are closed now; nothing else gets spawned
        t.top_up();
        assert!(t.lock().tasks.is_empty());
        assert_eq!(t.current().unwrap().name(), "explosive");
    }

    #[tokio::test]
    async fn finished_loads_are_pruned_without_settle() {
        let r = thread();
        let leaf = r.resolve_item(&Reference::link("leaf"), None).await.unwrap();
        let t = Timeline::from_item(leaf, &settings(1));
        t.top_up();
        assert_eq!(t.lock().tasks.len(), 2);

        for _ in 0..200 {
            if t.lock().tasks.iter().all(|h| h.is_finished()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snap = t.snapshot(1);
        assert!(!snap.loading_up && !snap.loading_down);

        // both neighbours are loaded, so this only prunes
        t.top_up();
        assert!(t.lock().tasks.is_empty());
    }
}
