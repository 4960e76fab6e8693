//! Run scheduling, progress publication and session state.

use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spatialprobe::ProbeError;
use spatialprobe::results::{Counts, Status, Summary};

use crate::common::{custom_session, png, session_for, test_config, two_category_catalog, wms_context};

fn assert_consistent(summary: &Summary) {
    let check = |counts: &Counts| {
        assert_eq!(counts.pass + counts.fail + counts.skip + counts.pending, counts.total);
        assert_eq!(counts.tested, counts.pass + counts.fail);
    };
    for counts in summary.categories.values() {
        check(counts);
    }
    check(&summary.global);
    let pending: usize = summary.categories.values().map(|c| c.pending).sum();
    assert_eq!(pending, summary.global.pending);
}

#[tokio::test]
async fn test_categories_complete_in_order() {
    let mut config = test_config("http://127.0.0.1:9", 0);
    config.schedule.category_delay_ms = 300;
    let session = Arc::new(custom_session(config, two_category_catalog()));
    let mut progress = session.subscribe();

    let run = tokio::spawn({
        let session = session.clone();
        async move { session.run_all().await }
    });

    let mut observed = Vec::new();
    loop {
        progress.changed().await.unwrap();
        let summary = progress.borrow_and_update().clone();
        assert_consistent(&summary);
        let done = summary.global.pending == 0;
        observed.push(summary);
        if done {
            break;
        }
    }

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.global.skip, 10);
    assert!(
        observed
            .iter()
            .any(|s| s.categories["one"].pending == 0 && s.categories["two"].pending == 5),
        "category one never finished before category two started"
    );
    // Category two never progresses while category one still has pending tests
    for s in &observed {
        if s.categories["one"].pending > 0 {
            assert_eq!(s.categories["two"].pending, 5);
        }
    }
}

/// Summaries published until the given category has no pending tests.
async fn observe_run(progress: &mut tokio::sync::watch::Receiver<Summary>, category: &str) -> Vec<Summary> {
    let mut observed = Vec::new();
    loop {
        progress.changed().await.unwrap();
        let summary = progress.borrow_and_update().clone();
        assert_consistent(&summary);
        let done = summary.categories[category].pending == 0;
        observed.push(summary);
        if done {
            return observed;
        }
    }
}

fn assert_forward_only(observed: &[Summary]) {
    for pair in observed.windows(2) {
        let (before, after) = (&pair[0].global, &pair[1].global);
        assert!(after.pending <= before.pending, "{:?} -> {:?}", before, after);
        assert!(
            after.pass + after.fail + after.skip >= before.pass + before.fail + before.skip,
            "{:?} -> {:?}",
            before,
            after
        );
    }
}

#[tokio::test]
async fn test_repeated_run_only_moves_forward() {
    let session = Arc::new(custom_session(test_config("http://127.0.0.1:9", 0), two_category_catalog()));
    session.run_all().await.unwrap();
    assert_eq!(session.summary().global.skip, 10);

    let mut progress = session.subscribe();
    progress.borrow_and_update();
    let run = tokio::spawn({
        let session = session.clone();
        async move { session.run_all().await }
    });
    let observed = observe_run(&mut progress, "two").await;
    run.await.unwrap().unwrap();

    assert_eq!(observed[0].global.pending, 10, "run did not start from a reset");
    assert_forward_only(&observed[1..]);
    assert_eq!(observed.last().unwrap().global.skip, 10);

    let run = tokio::spawn({
        let session = session.clone();
        async move { session.run_category("one").await }
    });
    let observed = observe_run(&mut progress, "one").await;
    run.await.unwrap().unwrap();

    assert_eq!(observed[0].categories["one"].pending, 5);
    assert_eq!(observed[0].categories["two"].skip, 5);
    assert_forward_only(&observed[1..]);
}

#[tokio::test]
async fn test_session_is_busy_during_run() {
    let session = Arc::new(custom_session(test_config("http://127.0.0.1:9", 0), two_category_catalog()));

    let run = tokio::spawn({
        let session = session.clone();
        async move { session.run_all().await }
    });

    while !session.is_busy() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(matches!(session.clear(), Err(ProbeError::Busy)));
    assert!(matches!(session.run_test("one-1").await, Err(ProbeError::Busy)));
    assert!(matches!(session.run_category("two").await, Err(ProbeError::Busy)));

    run.await.unwrap().unwrap();
    assert!(!session.is_busy());
    session.clear().unwrap();
}

#[tokio::test]
async fn test_clear_then_rerun_reproduces_statuses() {
    let session = custom_session(test_config("http://127.0.0.1:9", 0), two_category_catalog());

    session.clear().unwrap();
    session.clear().unwrap();
    assert_eq!(session.summary().global.pending, 10);

    let first = session.run_category("one").await.unwrap();
    assert_eq!(first.categories["one"].skip, 5);
    assert_eq!(first.categories["two"].pending, 5);

    session.clear().unwrap();
    let cleared = session.summary();
    assert_eq!(cleared.global.pending, 10);
    assert!(session.outcome("one-1").unwrap().checks.is_empty());
    assert_eq!(session.outcome("one-1").unwrap().status, Status::Pending);

    let second = session.run_category("one").await.unwrap();
    assert_eq!(second, first);

    // Re-running a single completed test replaces its outcome
    let outcome = session.run_test("one-3").await.unwrap();
    assert_eq!(outcome.status, Status::Skip);
    assert_eq!(session.summary(), second);
}

#[tokio::test]
async fn test_seeded_sampling_is_reproducible() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(256, 256)),
        )
        .mount(&server)
        .await;

    let mut sequences = Vec::new();
    for _ in 0..2 {
        let session = session_for(&server, 0);
        session.set_context(wms_context()).unwrap();
        let mut urls = Vec::new();
        for _ in 0..4 {
            let outcome = session.run_test("wms-time-dimension").await.unwrap();
            assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
            urls.push(outcome.last_request_url.unwrap());
        }
        sequences.push(urls);
    }
    assert_eq!(sequences[0], sequences[1]);
}
