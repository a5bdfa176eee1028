//! Logging and metrics plumbing shared by the engine and the demo binary.

use metrics::describe_counter;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG: &str = "FEDISCROLL_LOG";

/// One-time metrics registration (so series show up with descriptions).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "harvest_items_total",
            "Items returned from collection pages."
        );
        describe_counter!(
            "harvest_failures_total",
            "Failure items produced while harvesting."
        );
        describe_counter!(
            "pagination_aborts_total",
            "Collections abandoned after too many consecutive empty pages."
        );
        describe_counter!("page_fetches_total", "Collection pages fetched.");
        describe_counter!("splice_harvests_total", "Harvest calls served by a splicer.");
        describe_counter!(
            "timeline_topups_total",
            "Background top-ups merged into a timeline."
        );
    });
}

/// Enable compact tracing logs when `FEDISCROLL_LOG=1`.
///
/// The filter comes from `RUST_LOG`, defaulting to engine targets at info.
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let on = std::env::var(ENV_LOG).ok().as_deref() == Some("1");
    if !on {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("collection=info,splicer=info,timeline=info,navigator=info,warn")
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
