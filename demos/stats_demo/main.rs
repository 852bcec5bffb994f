//! Statsync demo
//!
//! Drives the engine against the in-memory store service:
//! - adds a local user and waits for the load
//! - writes bursts of stats that coalesce into single upserts
//! - simulates an outage and recovery
//! - polls `do_work` on a fixed cadence, like a host application would
//!
//! Run with: cargo run -p stats_demo

use clap::Parser;
use statsync_engine::{
    EngineConfig, LeaderboardProvider, MockLeaderboardProvider, RemoteStatsStore, StatEventKind,
    StatsEngine,
};
use statsync_model::LeaderboardQuery;
use statsync_server::StatsStoreService;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Statsync engine demo", long_about = None)]
struct Args {
    /// User id to simulate.
    #[arg(long, default_value = "player-1")]
    user: String,

    /// Number of write bursts to run.
    #[arg(long, default_value_t = 3)]
    bursts: u32,

    /// Event poll cadence in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let poll = Duration::from_millis(args.poll_ms);

    let service = Arc::new(StatsStoreService::new());
    let leaderboards = Arc::new(MockLeaderboardProvider::new());
    let engine = StatsEngine::new(
        EngineConfig::new("demo-scid")
            .with_flush_window(Duration::from_millis(500))
            .with_priority_flush_window(Duration::from_millis(100))
            .with_background_flush_interval(Duration::from_secs(5)),
        Arc::clone(&service) as Arc<dyn RemoteStatsStore>,
        leaderboards as Arc<dyn LeaderboardProvider>,
    );

    let user = args.user.as_str();
    engine.add_local_user(user).expect("add user");
    drain_until(&engine, poll, |kind| {
        matches!(kind, StatEventKind::LocalUserAdded)
    });

    for burst in 0..args.bursts {
        println!("--- burst {burst} ---");
        for i in 0..10 {
            engine
                .set_stat_as_integer(user, "kills", i64::from(burst * 10 + i))
                .expect("set stat");
        }
        engine
            .set_stat_as_number(user, "accuracy", f64::from(burst) / 10.0 + 0.5)
            .expect("set stat");

        // One outage in the middle shows the offline fallback and retry.
        if burst == 1 {
            println!("taking the store offline for this burst");
            service.set_online(false);
        }

        engine.request_flush(user, true).expect("request flush");
        drain_until(&engine, poll, |kind| {
            matches!(kind, StatEventKind::StatUpdateComplete)
        });

        if !service.is_online() {
            println!("bringing the store back online");
            service.set_online(true);
            engine.request_flush(user, true).expect("request flush");
            drain_until(&engine, poll, |kind| {
                matches!(kind, StatEventKind::StatUpdateComplete)
            });
        }
    }

    // The leaderboard mock has no scripted page, so this demonstrates an
    // error riding on the completion event.
    engine
        .request_leaderboard(user, LeaderboardQuery::new("kills").with_max_items(5))
        .expect("request leaderboard");
    drain_until(&engine, poll, |kind| {
        matches!(kind, StatEventKind::LeaderboardComplete(_))
    });

    engine.remove_local_user(user).expect("remove user");
    drain_until(&engine, poll, |kind| {
        matches!(kind, StatEventKind::LocalUserRemoved)
    });

    let stats = engine.stats();
    println!(
        "done: {} flushes attempted, {} succeeded, {} failed, server revision {:?}",
        stats.flushes_attempted,
        stats.flushes_succeeded,
        stats.flushes_failed,
        service.revision(user, "demo-scid"),
    );
}

/// Polls `do_work` on the configured cadence until an event matches.
fn drain_until(
    engine: &StatsEngine,
    poll: Duration,
    matches: impl Fn(&StatEventKind) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        for event in engine.do_work() {
            match &event.error {
                None => println!("event: {:?} for {}", event.kind, event.user_id),
                Some(err) => {
                    println!("event: {:?} for {} failed: {err}", event.kind, event.user_id)
                }
            }
            if matches(&event.kind) {
                return;
            }
        }
        if Instant::now() >= deadline {
            eprintln!("gave up waiting for an event");
            return;
        }
        thread::sleep(poll);
    }
}
