//! # Splicer
//! Lazy k-way merge of independently paginated sources into one stream,
//! newest first.
//!
//! Each input gets a strand: its remaining source, a lookahead buffer, and the
//! resume point inside that source. A harvest works on a private copy of the
//! strands, tops every open strand up to the number of items the call may
//! emit, then repeatedly pops the newest buffered front item. Because every
//! open buffer is at least that deep, the newest front is the newest item
//! overall.
//!
//! Ties on timestamp go to the earlier input.

use futures::future::join_all;
use metrics::counter;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::config::Settings;
use crate::failure::Failure;
use crate::item::ItemRef;
use crate::resolve::{Reference, Resolved, Resolver};
use crate::source::{Harvest, PaginatedSource, SourceRef};
use crate::telemetry::ensure_metrics_described;

/// What a splicer can be built from.
#[derive(Clone)]
pub enum SpliceInput {
    /// Merge this item's children (e.g. an actor's posts).
    Item(ItemRef),
    /// Merge this source directly.
    Source(SourceRef),
}

#[derive(Clone)]
struct Strand {
    source: Option<SourceRef>,
    buffer: VecDeque<ItemRef>,
    cursor: usize,
}

impl Strand {
    fn from_input(input: SpliceInput) -> Self {
        let source = match input {
            SpliceInput::Item(item) => item.children(),
            SpliceInput::Source(source) => Some(source),
        };
        Self {
            source,
            buffer: VecDeque::new(),
            cursor: 0,
        }
    }

    /// A strand that only ever yields one failure.
    fn failed(failure: ItemRef) -> Self {
        Self {
            source: None,
            buffer: VecDeque::from([failure]),
            cursor: 0,
        }
    }

    fn is_drained(&self) -> bool {
        self.source.is_none() && self.buffer.is_empty()
    }
}

#[derive(Clone)]
pub struct Splicer {
    strands: Vec<Strand>,
}

impl Splicer {
    pub fn new(inputs: Vec<SpliceInput>) -> Self {
        Self {
            strands: inputs.into_iter().map(Strand::from_input).collect(),
        }
    }

    /// Resolve user inputs concurrently and splice whatever they turn out to
    /// be. Inputs that fail to resolve contribute one failure item each.
    pub async fn open(
        references: &[Reference],
        resolver: Arc<dyn Resolver>,
        settings: &Settings,
    ) -> Self {
        let resolved = join_all(references.iter().map(|r| {
            let resolver = resolver.clone();
            async move { (r, resolver.resolve(r).await) }
        }))
        .await;

        let strands = resolved
            .into_iter()
            .map(|(reference, outcome)| match outcome {
                Ok(Resolved::Item(item)) => Strand::from_input(SpliceInput::Item(item)),
                Ok(Resolved::Collection(page)) => {
                    let c = Collection::from_page(page, resolver.clone(), settings);
                    Strand::from_input(SpliceInput::Source(Arc::new(c)))
                }
                Err(e) => {
                    warn!(
                        target: "splicer",
                        input = %reference,
                        error = %e,
                        "input failed to resolve"
                    );
                    counter!("harvest_failures_total").increment(1);
                    Strand::failed(Failure::item(
                        anyhow::Error::new(e).context(format!("opening {reference}")),
                    ))
                }
            })
            .collect();
        Self { strands }
    }

    pub fn len(&self) -> usize {
        self.strands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strands.is_empty()
    }

    /// Top every open strand up to `target` buffered items.
    ///
    /// A source that comes back empty but still open is left open and not
    /// polled again during this call.
    async fn replenish(&mut self, target: usize) {
        let mut stalled = vec![false; self.strands.len()];
        loop {
            let wanted: Vec<(usize, SourceRef, usize, usize)> = self
                .strands
                .iter()
                .enumerate()
                .filter(|(i, _)| !stalled[*i])
                .filter_map(|(i, s)| {
                    let source = s.source.as_ref()?;
                    let short = target.checked_sub(s.buffer.len()).filter(|n| *n > 0)?;
                    Some((i, source.clone(), s.cursor, short))
                })
                .collect();
            if wanted.is_empty() {
                return;
            }

            let results = join_all(wanted.into_iter().map(|(i, source, cursor, short)| async move {
                (i, source.harvest(short, cursor).await)
            }))
            .await;

            for (i, h) in results {
                let strand = &mut self.strands[i];
                if h.items.is_empty() && h.continuation.is_some() {
                    debug!(
                        target: "splicer",
                        strand = i,
                        "source returned nothing but is not exhausted"
                    );
                    stalled[i] = true;
                }
                strand.buffer.extend(h.items);
                strand.source = h.continuation;
                strand.cursor = h.next_starting_point;
            }
        }
    }

    /// Pop the newest front item across all strands.
    fn pop_most_recent(&mut self) -> Option<ItemRef> {
        let mut best: Option<usize> = None;
        for (i, strand) in self.strands.iter().enumerate() {
            let Some(candidate) = strand.buffer.front() else {
                continue;
            };
            match best {
                None => best = Some(i),
                Some(b) => {
                    let incumbent = self.strands[b].buffer.front().map(|x| x.timestamp());
                    if Some(candidate.timestamp()) > incumbent {
                        best = Some(i);
                    }
                }
            }
        }
        self.strands[best?].buffer.pop_front()
    }

    fn is_drained(&self) -> bool {
        self.strands.iter().all(Strand::is_drained)
    }
}

#[async_trait::async_trait]
impl PaginatedSource for Splicer {
    async fn harvest(&self, quantity: usize, starting_point: usize) -> Harvest {
        ensure_metrics_described();
        counter!("splice_harvests_total").increment(1);

        let mut clone = self.clone();
        clone.replenish(quantity + starting_point).await;

        for _ in 0..starting_point {
            if clone.pop_most_recent().is_none() {
                return Harvest::exhausted(Vec::new());
            }
        }

        let mut items = Vec::with_capacity(quantity);
        for _ in 0..quantity {
            match clone.pop_most_recent() {
                Some(item) => items.push(item),
                None => return Harvest::exhausted(items),
            }
        }

        debug!(
            target: "splicer",
            emitted = items.len(),
            strands = clone.len(),
            "splice harvest"
        );
        let continuation: Option<SourceRef> = if clone.is_drained() {
            None
        } else {
            Some(Arc::new(clone))
        };
        Harvest {
            items,
            continuation,
            next_starting_point: 0,
        }
    }
}
