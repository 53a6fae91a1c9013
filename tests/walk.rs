mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_options, name, walk, walk_with, MockZone};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use zonewalk::walker::WalkOptions;
use zonewalk::{EndReason, PartitionPlanner};

fn small_zone() -> MockZone {
    MockZone::new(
        "example.com",
        &[
            "www.example.com",
            "mail.example.com",
            "Ftp.Example.Com",
            "_dmarc.example.com",
            "z.example.com",
        ],
    )
}

#[tokio::test(start_paused = true)]
async fn walks_whole_zone() {
    let zone = Arc::new(small_zone());
    let res = walk(zone.clone(), 1).await;
    assert_eq!(
        res.names,
        [
            "_dmarc.example.com",
            "ftp.example.com",
            "mail.example.com",
            "www.example.com",
            "z.example.com",
        ]
    );
    assert_eq!(res.summaries.len(), 1);
    let summary = &res.summaries[0];
    assert_eq!(summary.reason, EndReason::Wrapped);
    assert_eq!(summary.names, 5);
    assert_eq!(summary.queries, 6);
    assert_eq!(zone.queries(), 6);
}

#[tokio::test(start_paused = true)]
async fn empty_zone() {
    let zone = Arc::new(MockZone::new("example.com", &[]));
    let res = walk(zone, 1).await;
    assert!(res.names.is_empty());
    assert_eq!(res.summaries[0].reason, EndReason::Wrapped);
}

#[tokio::test(start_paused = true)]
async fn names_below_gaps_are_found() {
    // There is no q.example.com, only a name below it.
    let zone = Arc::new(MockZone::new(
        "example.com",
        &["a.example.com", "x.q.example.com", "r.example.com"],
    ));
    let res = walk(zone, 1).await;
    assert_eq!(
        res.names,
        ["a.example.com", "x.q.example.com", "r.example.com"]
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let zone = Arc::new(small_zone().failing_every(3));
    let res = walk(zone.clone(), 1).await;
    assert_eq!(res.names.len(), 5);
    assert!(res.is_complete());
    // Six successful steps plus every third query failing.
    assert_eq!(res.summaries[0].queries, 8);
    assert_eq!(zone.queries(), 8);
}

#[tokio::test(start_paused = true)]
async fn insecure_zone_is_not_walked() {
    let zone = Arc::new(small_zone().insecure());
    let res = walk(zone.clone(), 4).await;
    assert!(res.names.is_empty());
    assert!(!res.is_complete());
    for summary in &res.summaries {
        assert_eq!(summary.reason, EndReason::Unsecured);
        assert_eq!(summary.queries, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn resumes_after_start() {
    let zone = Arc::new(small_zone());
    let planner = PartitionPlanner::new(
        zone.apex().clone(),
        1,
        Some(name("mail.example.com")),
        fast_options(),
    )
    .unwrap();
    let res = walk_with(zone, &planner, CancellationToken::new()).await;
    assert_eq!(res.names, ["www.example.com", "z.example.com"]);
    assert!(res.is_complete());
}

#[tokio::test(start_paused = true)]
async fn resume_start_need_not_exist() {
    let zone = Arc::new(small_zone());
    let planner = PartitionPlanner::new(
        zone.apex().clone(),
        1,
        Some(name("n.example.com")),
        fast_options(),
    )
    .unwrap();
    let res = walk_with(zone, &planner, CancellationToken::new()).await;
    assert_eq!(res.names, ["www.example.com", "z.example.com"]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_walk_stops() {
    let zone = Arc::new(small_zone());
    let planner = PartitionPlanner::new(
        zone.apex().clone(),
        3,
        None,
        fast_options(),
    )
    .unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let res = walk_with(zone.clone(), &planner, shutdown).await;
    assert!(res.names.is_empty());
    assert_eq!(res.summaries.len(), 3);
    for summary in &res.summaries {
        assert_eq!(summary.reason, EndReason::Cancelled);
    }
    assert_eq!(zone.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn closed_output_stops_walk() {
    let zone = Arc::new(small_zone());
    let planner =
        PartitionPlanner::new(zone.apex().clone(), 1, None, fast_options())
            .unwrap();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let summaries = planner.run(zone, tx, CancellationToken::new()).await;
    assert_eq!(summaries[0].reason, EndReason::OutputClosed);
    assert!(!summaries[0].reason.is_complete());
}

#[tokio::test(start_paused = true)]
async fn steps_are_rate_limited() {
    let zone = Arc::new(small_zone());
    let options = WalkOptions {
        rate: 10,
        ..fast_options()
    };
    let planner =
        PartitionPlanner::new(zone.apex().clone(), 1, None, options).unwrap();
    let start = Instant::now();
    let res = walk_with(zone, &planner, CancellationToken::new()).await;
    assert_eq!(res.names.len(), 5);
    // Six steps, five intervals between them.
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}
