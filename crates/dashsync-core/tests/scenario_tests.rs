use dashsync_core::prelude::*;
use dashsync_core::TimeoutBudgets;
use dashsync_model::FetchErrorKind;
use dashsync_test_utils::{
    insights_payload, rows_payload, snapshot_payload, ScriptedFetcher, Step,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn provider(fetcher: &Arc<ScriptedFetcher>, config: SyncConfig) -> SyncProvider {
    SyncProvider::create(config, Arc::clone(fetcher)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn subscribing_to_idle_domain_fetches_once() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::Progress,
        Step::ok(rows_payload(3)).after(Duration::from_millis(200)),
    ));
    let provider = provider(&fetcher, SyncConfig::new());

    let mut progress = provider.subscribe(DomainKey::Progress, HookOptions::default());
    let first = progress.view();
    assert_eq!(first.status, Status::Loading);
    assert!(first.is_initial_loading);
    assert!(!first.is_refreshing);

    let second = provider.subscribe(DomainKey::Progress, HookOptions::default());

    while progress.changed().await {
        if !progress.view().is_loading {
            break;
        }
    }

    let view = progress.view();
    assert_eq!(view.status, Status::Success);
    assert!(!view.is_initial_loading);
    assert_eq!(view.data.map(|d| d.row_count()), Some(3));
    assert_eq!(second.view().status, Status::Success);
    assert_eq!(fetcher.calls(&DomainKey::Progress), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_refetch_shows_refreshing_with_previous_data() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .then(DomainKey::Risk, Step::ok(rows_payload(1)))
            .then(
                DomainKey::Risk,
                Step::ok(rows_payload(4)).after(Duration::from_secs(1)),
            ),
    );
    let provider = provider(&fetcher, SyncConfig::new());
    provider.load(&DomainKey::Risk, false).await.unwrap();

    let risk = provider.subscribe(DomainKey::Risk, HookOptions::default());
    let refetch = risk.refetch(RefetchOptions::default());
    tokio::pin!(refetch);

    tokio::select! {
        biased;
        _ = &mut refetch => panic!("refetch finished before its delay"),
        () = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
    let view = risk.view();
    assert!(view.is_refreshing);
    assert!(!view.is_initial_loading);
    assert_eq!(view.data.map(|d| d.row_count()), Some(1));

    let data = refetch.await.unwrap().unwrap();
    assert_eq!(data.row_count(), 4);
    assert_eq!(risk.view().data.map(|d| d.row_count()), Some(4));
}

#[tokio::test(start_paused = true)]
async fn monthly_snapshots_load_independently() {
    let september = DomainKey::monthly_snapshot("2025-09").unwrap();
    let august = DomainKey::monthly_snapshot("2025-08").unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .always(
                september.clone(),
                Step::ok(snapshot_payload("2025-09")).after(Duration::from_millis(300)),
            )
            .always(
                august.clone(),
                Step::ok(snapshot_payload("2025-08")).after(Duration::from_secs(2)),
            ),
    );
    let provider = provider(&fetcher, SyncConfig::new());

    let august_load = {
        let provider = provider.clone();
        let august = august.clone();
        tokio::spawn(async move { provider.load(&august, false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // forcing september must not disturb august
    provider.load(&september, true).await.unwrap();
    let data = provider.load(&september, true).await.unwrap();
    match data {
        DomainData::MonthlySnapshot(snapshot) => assert_eq!(snapshot.month.as_str(), "2025-09"),
        other => panic!("unexpected payload {other:?}"),
    }

    let august_data = august_load.await.unwrap().unwrap();
    assert_eq!(august_data.row_count(), 2);
    assert_eq!(fetcher.calls(&august), 1);
    assert_eq!(fetcher.calls(&september), 2);
    assert!(provider.state(&august).is_success());
}

#[tokio::test(start_paused = true)]
async fn rejected_insights_are_permanent_and_not_swept() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::AiInsights,
        Step::err(FetchError::http(400, "prompt rejected").with_code("BAD_PROMPT")),
    ));
    let provider = provider(&fetcher, SyncConfig::new());
    let mut notices = provider.notifications();

    let err = provider.load(&DomainKey::AiInsights, false).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Http);
    assert_eq!(err.status, Some(400));
    assert_eq!(err.code.as_deref(), Some("BAD_PROMPT"));
    assert!(!err.retryable);

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(provider.sweep_now(), 0);
    assert_eq!(fetcher.calls(&DomainKey::AiInsights), 1);
    assert!(provider.state(&DomainKey::AiInsights).is_error());

    assert_eq!(notices.try_recv().unwrap().attempt, 1);
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn insights_decode_opaque_value() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(DomainKey::AiInsights, Step::ok(insights_payload())));
    let provider = provider(&fetcher, SyncConfig::new());

    match provider.load(&DomainKey::AiInsights, false).await.unwrap() {
        DomainData::AiInsights(value) => assert_eq!(value["summary"], "on track"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_collaborator_times_out_and_is_aborted() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::Risk,
        Step::ok(rows_payload(1)).after(Duration::from_secs(15)),
    ));
    let config = SyncConfig::new().with_timeouts(TimeoutBudgets {
        default_ms: 10_000,
        ..TimeoutBudgets::default()
    });
    let provider = provider(&fetcher, config);

    let started = tokio::time::Instant::now();
    let err = provider.load(&DomainKey::Risk, false).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.retryable);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(15));

    let signal = fetcher.last_signal(&DomainKey::Risk).unwrap();
    assert!(signal.is_cancelled());
    assert!(provider.state(&DomainKey::Risk).is_error());
}

#[tokio::test(start_paused = true)]
async fn unknown_month_is_not_found() {
    let key = DomainKey::monthly_snapshot("2025-13").unwrap();
    assert!(!key.year_month().unwrap().is_calendar_month());

    let fetcher = Arc::new(ScriptedFetcher::new().then(
        key.clone(),
        Step::err(FetchError::not_found("Snapshot for 2025-13 not found")),
    ));
    let provider = provider(&fetcher, SyncConfig::new());

    let err = provider.load(&key, false).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.retryable);
    assert_eq!(err.message, "Snapshot for 2025-13 not found");
}

#[tokio::test(start_paused = true)]
async fn mismatched_snapshot_month_is_a_parse_error() {
    let key = DomainKey::monthly_snapshot("2025-09").unwrap();
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(key.clone(), Step::ok(snapshot_payload("2025-08"))));
    let provider = provider(&fetcher, SyncConfig::new());

    let err = provider.load(&key, false).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Parse);
    assert!(!err.retryable);
}

#[tokio::test(start_paused = true)]
async fn refetch_inside_throttle_window_is_dropped() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(DomainKey::Manpower, Step::ok(rows_payload(2))));
    let provider = provider(&fetcher, SyncConfig::new());
    let manpower = provider.subscribe(DomainKey::Manpower, HookOptions::passive());
    assert_eq!(manpower.view().status, Status::Idle);

    assert!(manpower.refetch(RefetchOptions::default()).await.is_some());
    tokio::time::advance(Duration::from_millis(1_999)).await;
    assert!(manpower.refetch(RefetchOptions::default()).await.is_none());
    assert_eq!(fetcher.calls(&DomainKey::Manpower), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(manpower.refetch(RefetchOptions::default()).await.is_some());
    assert_eq!(fetcher.calls(&DomainKey::Manpower), 2);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_hook_is_inert() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(DomainKey::Progress, Step::ok(rows_payload(1))));
    let provider = provider(&fetcher, SyncConfig::new());
    let mut progress = provider.subscribe(DomainKey::Progress, HookOptions::passive());

    progress.unsubscribe();
    assert!(progress.refetch(RefetchOptions::default()).await.is_none());
    assert!(!progress.changed().await);
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn superseded_attempt_never_reaches_state() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .then(
                DomainKey::Progress,
                Step::ok(rows_payload(1)).after(Duration::from_secs(5)),
            )
            .then(
                DomainKey::Progress,
                Step::ok(rows_payload(3)).after(Duration::from_secs(1)),
            ),
    );
    let provider = provider(&fetcher, SyncConfig::new());
    let mut notices = provider.notifications();

    let stale = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.load(&DomainKey::Progress, false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fresh = provider.load(&DomainKey::Progress, true).await.unwrap();
    assert_eq!(fresh.row_count(), 3);
    assert!(stale.await.unwrap().unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let state = provider.state(&DomainKey::Progress);
    assert_eq!(state.data().map(DomainData::row_count), Some(3));
    assert!(notices.try_recv().is_err());
    assert_eq!(provider.coordinator_stats().superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_refreshes_stale_success_domains() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(DomainKey::Progress, Step::ok(rows_payload(2))));
    let config = SyncConfig::new()
        .with_ttl(Duration::from_secs(10))
        .with_sweep_interval(Duration::from_secs(30));
    let provider = provider(&fetcher, config);

    provider.load(&DomainKey::Progress, false).await.unwrap();
    assert_eq!(fetcher.calls(&DomainKey::Progress), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(fetcher.calls(&DomainKey::Progress), 2);
    assert!(provider.state(&DomainKey::Progress).is_success());
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_next_load_upstream() {
    let fetcher =
        Arc::new(ScriptedFetcher::new().always(DomainKey::Risk, Step::ok(rows_payload(1))));
    let provider = provider(&fetcher, SyncConfig::new());

    provider.load(&DomainKey::Risk, false).await.unwrap();
    provider.load(&DomainKey::Risk, false).await.unwrap();
    assert_eq!(fetcher.calls(&DomainKey::Risk), 1);

    provider.invalidate(&DomainKey::Risk);
    provider.load(&DomainKey::Risk, false).await.unwrap();
    assert_eq!(fetcher.calls(&DomainKey::Risk), 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_outstanding_fetches() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::Manpower,
        Step::ok(rows_payload(1)).after(Duration::from_secs(5)),
    ));
    let provider = provider(&fetcher, SyncConfig::new());

    let pending = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.load(&DomainKey::Manpower, false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.in_flight_count(), 1);

    provider.dispose();
    assert!(pending.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(provider.in_flight_count(), 0);
    assert!(fetcher.last_signal(&DomainKey::Manpower).unwrap().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn abandoned_refetch_still_settles_state() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::Progress,
        Step::ok(rows_payload(2)).after(Duration::from_secs(1)),
    ));
    let provider = provider(&fetcher, SyncConfig::new());
    let progress = provider.subscribe(DomainKey::Progress, HookOptions::passive());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        progress.refetch(RefetchOptions::default()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(progress.view().status, Status::Loading);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = progress.view();
    assert_eq!(view.status, Status::Success);
    assert!(!view.is_initial_loading);
    assert_eq!(view.data.map(|d| d.row_count()), Some(2));

    let later = provider.subscribe(DomainKey::Progress, HookOptions::default());
    assert_eq!(later.view().status, Status::Success);
    assert_eq!(fetcher.calls(&DomainKey::Progress), 1);
    assert_eq!(provider.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn coalesced_loads_share_one_attempt() {
    let fetcher = Arc::new(ScriptedFetcher::new().always(
        DomainKey::Risk,
        Step::err(FetchError::http(503, "upstream unavailable"))
            .after(Duration::from_millis(100)),
    ));
    let provider = provider(&fetcher, SyncConfig::new());
    let mut notices = provider.notifications();

    let (first, second) = tokio::join!(
        provider.load(&DomainKey::Risk, false),
        provider.load(&DomainKey::Risk, false),
    );
    assert_eq!(first.unwrap_err().status, Some(503));
    assert_eq!(second.unwrap_err().status, Some(503));
    assert_eq!(fetcher.calls(&DomainKey::Risk), 1);
    assert_eq!(provider.coordinator_stats().coalesced, 1);

    assert_eq!(notices.try_recv().unwrap().attempt, 1);
    assert!(notices.try_recv().is_err());

    provider.load(&DomainKey::Risk, true).await.unwrap_err();
    assert_eq!(notices.try_recv().unwrap().attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn superseded_failure_is_neither_committed_nor_announced() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .then(
                DomainKey::Manpower,
                Step::err(FetchError::http(503, "upstream unavailable"))
                    .after(Duration::from_secs(5)),
            )
            .then(
                DomainKey::Manpower,
                Step::ok(rows_payload(2)).after(Duration::from_secs(1)),
            ),
    );
    let provider = provider(&fetcher, SyncConfig::new());
    let mut notices = provider.notifications();

    let stale = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.load(&DomainKey::Manpower, false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fresh = provider.load(&DomainKey::Manpower, true).await.unwrap();
    assert_eq!(fresh.row_count(), 2);
    assert!(stale.await.unwrap().unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(provider.state(&DomainKey::Manpower).is_success());
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn superseded_attempt_settling_first_leaves_newer_attempt_loading() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .then(
                DomainKey::Progress,
                Step::err(FetchError::http(503, "upstream unavailable"))
                    .after(Duration::from_secs(1)),
            )
            .then(
                DomainKey::Progress,
                Step::ok(rows_payload(4)).after(Duration::from_secs(5)),
            ),
    );
    let provider = provider(&fetcher, SyncConfig::new());
    let mut notices = provider.notifications();

    let stale = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.load(&DomainKey::Progress, false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let fresh = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.load(&DomainKey::Progress, true).await })
    };

    assert!(stale.await.unwrap().unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.state(&DomainKey::Progress).status(), Status::Loading);
    assert!(notices.try_recv().is_err());

    assert_eq!(fresh.await.unwrap().unwrap().row_count(), 4);
    assert!(provider.state(&DomainKey::Progress).is_success());
    assert!(notices.try_recv().is_err());
}
