//! # In-memory fixtures
//! A [`Resolver`] over a map of JSON objects, plus a minimal post/profile item
//! decoded from them. Backs the test-suite and the demo binary in place of a
//! network resolver.
//!
//! Objects loosely follow the usual federated vocabulary: `type`, `id`,
//! `published`, `content`, `inReplyTo`, `replies`/`outbox`, and for
//! collections `items`/`orderedItems`, `first`/`next`, `totalItems`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::collection::Deferred;
use crate::config::Settings;
use crate::failure::Failure;
use crate::item::{Ancestry, Item, ItemRef, Link};
use crate::resolve::{FieldError, Page, Reference, ResolveError, Resolver};
use crate::source::SourceRef;
use crate::text::{squash, truncate, wrap};

const POST_KINDS: &[&str] = &["Article", "Audio", "Document", "Image", "Note", "Page", "Video"];
const ACTOR_KINDS: &[&str] = &["Application", "Group", "Organization", "Person", "Service"];
const COLLECTION_KINDS: &[&str] = &[
    "Collection",
    "OrderedCollection",
    "CollectionPage",
    "OrderedCollectionPage",
];

#[derive(Default)]
struct Inner {
    objects: RwLock<HashMap<String, Value>>,
    errors: RwLock<HashMap<String, String>>,
    fetches: AtomicUsize,
    settings: Settings,
}

/// Cheap to clone; clones share the same object store.
#[derive(Clone, Default)]
pub struct MemoryResolver {
    inner: Arc<Inner>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                ..Default::default()
            }),
        }
    }

    /// Load a JSON array of objects, each carrying a string `id`.
    pub fn from_json_str(s: &str, settings: Settings) -> Result<Self> {
        let objects: Vec<Value> = serde_json::from_str(s).context("parsing fixture json")?;
        let r = Self::with_settings(settings);
        for (i, o) in objects.into_iter().enumerate() {
            if o.get("id").and_then(Value::as_str).is_none() {
                anyhow::bail!("fixture object #{i} has no string `id`");
            }
            r.insert(o);
        }
        Ok(r)
    }

    /// Store an object under its `id`. Objects without one are ignored.
    pub fn insert(&self, object: Value) {
        if let Some(id) = object.get("id").and_then(Value::as_str) {
            let id = id.to_string();
            self.inner
                .objects
                .write()
                .expect("fixture store poisoned")
                .insert(id, object);
        }
    }

    /// Make every fetch of `locator` fail with `reason`.
    pub fn insert_error(&self, locator: &str, reason: &str) {
        self.inner
            .errors
            .write()
            .expect("fixture store poisoned")
            .insert(locator.to_string(), reason.to_string());
    }

    /// Number of lookups by locator so far (embedded objects are free).
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn shared(&self) -> Arc<dyn Resolver> {
        Arc::new(self.clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<(Value, Option<Reference>), ResolveError> {
        let locator = match reference {
            Reference::Embedded(v) if v.get("type").is_some() => {
                let id = v.get("id").and_then(Value::as_str).map(Reference::link);
                return Ok((v.clone(), id));
            }
            Reference::Embedded(v) => match v.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    return Err(ResolveError::Field(FieldError::Malformed {
                        field: "id",
                        reason: "embedded object has neither type nor id".into(),
                    }))
                }
            },
            Reference::Link(s) => s.clone(),
        };

        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self
            .inner
            .errors
            .read()
            .expect("fixture store poisoned")
            .get(&locator)
        {
            return Err(ResolveError::Fetch {
                locator,
                reason: reason.clone(),
            });
        }
        let objects = self.inner.objects.read().expect("fixture store poisoned");
        match objects.get(&locator) {
            Some(v) => Ok((v.clone(), Some(Reference::Link(locator)))),
            None => Err(ResolveError::NotFound(locator)),
        }
    }
}

fn kind_of(o: &Value) -> Result<String, FieldError> {
    match o.get("type") {
        None => Err(FieldError::Absent("type")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(FieldError::Malformed {
            field: "type",
            reason: "expected a string".into(),
        }),
    }
}

fn reference_field(o: &Value, field: &'static str) -> Result<Reference, FieldError> {
    match o.get(field) {
        None | Some(Value::Null) => Err(FieldError::Absent(field)),
        Some(Value::String(s)) => Ok(Reference::Link(s.clone())),
        Some(v @ Value::Object(_)) => Ok(Reference::Embedded(v.clone())),
        Some(_) => Err(FieldError::Malformed {
            field,
            reason: "expected a link or an object".into(),
        }),
    }
}

fn reference_list(o: &Value, field: &'static str) -> Result<Vec<Reference>, FieldError> {
    let list = match o.get(field) {
        None | Some(Value::Null) => return Err(FieldError::Absent(field)),
        Some(Value::Array(list)) => list,
        Some(_) => {
            return Err(FieldError::Malformed {
                field,
                reason: "expected a list".into(),
            })
        }
    };
    list.iter()
        .map(|v| match v {
            Value::String(s) => Ok(Reference::Link(s.clone())),
            Value::Object(_) => Ok(Reference::Embedded(v.clone())),
            _ => Err(FieldError::Malformed {
                field,
                reason: "list members must be links or objects".into(),
            }),
        })
        .collect()
}

fn time_field(o: &Value, field: &'static str) -> Result<DateTime<Utc>, FieldError> {
    match o.get(field) {
        None | Some(Value::Null) => Err(FieldError::Absent(field)),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| FieldError::Malformed {
                field,
                reason: e.to_string(),
            }),
        Some(_) => Err(FieldError::Malformed {
            field,
            reason: "expected an RFC 3339 string".into(),
        }),
    }
}

fn string_field(o: &Value, field: &str) -> Option<String> {
    o.get(field).and_then(Value::as_str).map(str::to_string)
}

fn decode_page(o: &Value, id: Option<Reference>) -> Result<Page, ResolveError> {
    let kind = kind_of(o)?;
    if !COLLECTION_KINDS.contains(&kind.as_str()) {
        return Err(ResolveError::WrongType {
            kind,
            expected: "collection",
        });
    }
    let ordered = kind.starts_with("Ordered");
    let is_page = kind.ends_with("Page");
    Ok(Page {
        id,
        items: reference_list(o, if ordered { "orderedItems" } else { "items" }),
        next: reference_field(o, if is_page { "next" } else { "first" }),
        size: o.get("totalItems").and_then(Value::as_u64),
        kind,
    })
}

#[async_trait::async_trait]
impl Resolver for MemoryResolver {
    async fn resolve_item(
        &self,
        reference: &Reference,
        _source: Option<&Reference>,
    ) -> Result<ItemRef, ResolveError> {
        let (o, id) = self.lookup(reference)?;
        let note = Note::decode(&o, id, self.clone())?;
        Ok(Arc::new(note))
    }

    async fn resolve_page(
        &self,
        reference: &Reference,
        _source: Option<&Reference>,
    ) -> Result<Page, ResolveError> {
        let (o, id) = self.lookup(reference)?;
        decode_page(&o, id)
    }
}

/// A post or profile decoded from a fixture object.
pub struct Note {
    id: Option<Reference>,
    kind: String,
    author: Option<String>,
    published: Result<DateTime<Utc>, FieldError>,
    content: String,
    in_reply_to: Result<Reference, FieldError>,
    children: Result<Reference, FieldError>,
    links: Vec<String>,
    resolver: MemoryResolver,
}

impl Note {
    fn decode(
        o: &Value,
        id: Option<Reference>,
        resolver: MemoryResolver,
    ) -> Result<Self, ResolveError> {
        let kind = kind_of(o)?;
        let is_actor = ACTOR_KINDS.contains(&kind.as_str());
        if !is_actor && !POST_KINDS.contains(&kind.as_str()) {
            return Err(ResolveError::WrongType {
                kind,
                expected: "post or actor",
            });
        }

        let author = string_field(o, "name")
            .or_else(|| string_field(o, "preferredUsername"))
            .or_else(|| string_field(o, "attributedTo"));
        let content = string_field(o, "content")
            .or_else(|| string_field(o, "summary"))
            .unwrap_or_default();

        let mut links: Vec<String> = match o.get("url") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(v)) => v
                .iter()
                .filter_map(|x| x.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if let Some(Value::Array(att)) = o.get("attachment") {
            links.extend(att.iter().filter_map(|a| string_field(a, "url")));
        }

        Ok(Self {
            id,
            author,
            published: time_field(o, "published"),
            content,
            in_reply_to: if is_actor {
                Err(FieldError::Absent("inReplyTo"))
            } else {
                reference_field(o, "inReplyTo")
            },
            children: reference_field(o, if is_actor { "outbox" } else { "replies" }),
            links,
            kind,
            resolver,
        })
    }

    fn header(&self, width: usize) -> String {
        let mut header = self.kind.to_lowercase();
        if self.in_reply_to.is_ok() {
            header = "comment".to_string();
        }
        if let Some(author) = &self.author {
            header.push_str(" by ");
            header.push_str(author);
        }
        match &self.published {
            Ok(t) => header.push_str(&format!(" · {}", t.format("%Y-%m-%d %H:%M"))),
            Err(e) if !e.is_absent() => header.push_str(&format!(" · [{e}]")),
            Err(_) => {}
        }
        truncate(&header, width)
    }
}

#[async_trait::async_trait]
impl Item for Note {
    fn name(&self) -> String {
        self.author
            .clone()
            .or_else(|| self.id.as_ref().map(|id| id.to_string()))
            .unwrap_or_else(|| self.kind.clone())
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published.as_ref().ok().copied()
    }

    fn render(&self, width: usize) -> String {
        let mut out = vec![self.header(width)];
        out.extend(wrap(&self.content, width));
        for (i, link) in self.links.iter().enumerate() {
            out.push(truncate(&format!("[{}] {link}", i + 1), width));
        }
        out.join("\n")
    }

    fn preview(&self, width: usize) -> String {
        format!(
            "{}\n{}",
            self.header(width),
            truncate(&squash(&self.content), width)
        )
    }

    async fn parents(&self, quantity: usize) -> Ancestry {
        if quantity == 0 {
            return Ancestry::ended();
        }
        let parent_ref = match &self.in_reply_to {
            Ok(r) => r,
            Err(e) if e.is_absent() => return Ancestry::ended(),
            Err(e) => {
                return Ancestry {
                    items: vec![Failure::item(e.clone())],
                    frontier: None,
                }
            }
        };
        let parent = match self.resolver.resolve_item(parent_ref, self.id.as_ref()).await {
            Ok(p) => p,
            Err(e) => {
                return Ancestry {
                    items: vec![Failure::item(e)],
                    frontier: None,
                }
            }
        };
        if quantity == 1 {
            return Ancestry {
                items: vec![parent.clone()],
                frontier: Some(parent),
            };
        }
        let above = parent.parents(quantity - 1).await;
        let mut items = Vec::with_capacity(above.items.len() + 1);
        items.push(parent);
        items.extend(above.items);
        Ancestry {
            items,
            frontier: above.frontier,
        }
    }

    fn children(&self) -> Option<SourceRef> {
        let reference = self.children.as_ref().ok()?;
        Some(Arc::new(Deferred::new(
            reference.clone(),
            self.id.clone(),
            self.resolver.shared(),
            &self.resolver.inner.settings,
        )))
    }

    fn select_link(&self, index: usize) -> Option<Link> {
        let locator = self.links.get(index.checked_sub(1)?)?;
        Some(Link {
            locator: locator.clone(),
            media_type: None,
        })
    }
}

// --- builders for tests and demos ---

/// A fixed, readable base time.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// RFC 3339 timestamp `m` minutes after [`epoch`].
pub fn minutes(m: i64) -> String {
    (epoch() + Duration::minutes(m)).to_rfc3339()
}

pub fn note(id: &str, published: &str, content: &str) -> Value {
    json!({"id": id, "type": "Note", "published": published, "content": content})
}

pub fn reply(id: &str, published: &str, content: &str, in_reply_to: &str) -> Value {
    json!({
        "id": id,
        "type": "Note",
        "published": published,
        "content": content,
        "inReplyTo": in_reply_to,
    })
}

/// An `OrderedCollectionPage` listing `items` by id.
pub fn page(id: &str, items: &[&str], next: Option<&str>) -> Value {
    let mut p = json!({"id": id, "type": "OrderedCollectionPage", "orderedItems": items});
    if let Some(next) = next {
        p["next"] = Value::String(next.to_string());
    }
    p
}
