//! Demo that splices the configured `home` feed from a JSON fixture, scrolls
//! through it, then opens the selected post as a thread.
//!
//! Fixture path: `$FEDISCROLL_FIXTURE`, else `demos/fixture.json`.

use anyhow::{Context, Result};
use fediscroll::text::truncate;
use fediscroll::{fixture::MemoryResolver, telemetry, Navigator, Relation, Settings, Timeline};

const ENV_FIXTURE: &str = "FEDISCROLL_FIXTURE";
const DEFAULT_FIXTURE: &str = "demos/fixture.json";
const WIDTH: usize = 72;
const CONTEXT: usize = 2;

fn print_frame(label: &str, timeline: &Timeline) {
    let snap = timeline.snapshot(CONTEXT);
    println!("── {label} {}", "─".repeat(WIDTH.saturating_sub(label.len() + 4)));
    if snap.loading_up {
        println!("   (loading…)");
    }
    for e in &snap.entries {
        let marker = match (e.offset, e.relation) {
            (0, _) => ">",
            (_, Relation::Parent) => "↑",
            (_, Relation::Child) => " ",
            (_, Relation::Origin) => "*",
        };
        let body = if e.offset == 0 {
            e.item.render(WIDTH - 3)
        } else {
            e.item.preview(WIDTH - 3)
        };
        for (i, line) in body.lines().enumerate() {
            println!("{} {}", if i == 0 { marker } else { " " }, truncate(line, WIDTH - 2));
        }
    }
    if snap.loading_down {
        println!("   (loading…)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; harmless if missing.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let settings = Settings::load_default()?;
    let path = std::env::var(ENV_FIXTURE).unwrap_or_else(|_| DEFAULT_FIXTURE.to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading fixture {path}"))?;
    let resolver = MemoryResolver::from_json_str(&raw, settings.clone())?;

    let mut nav = Navigator::new(resolver.shared(), settings);
    let home = nav.open_feed("home").await.context("opening the home feed")?;
    home.settle().await;
    print_frame("home", &home);

    for step in 1..=5 {
        if !home.move_down() {
            break;
        }
        home.settle().await;
        print_frame(&format!("home, down {step}"), &home);
    }

    let thread = nav.open_current().context("opening the selected post")?;
    thread.settle().await;
    print_frame("thread", &thread);

    if let Some(link) = nav.link(1) {
        println!("link [1]: {}", link.locator);
    }

    println!("scroll-demo done, {} fixture fetches", resolver.fetch_count());
    Ok(())
}
