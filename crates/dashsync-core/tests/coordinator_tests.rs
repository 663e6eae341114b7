use dashsync_cache::CacheLayer;
use dashsync_core::{FetchOptions, RequestCoordinator};
use dashsync_model::{DomainKey, FetchError};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn options() -> FetchOptions {
    FetchOptions::new(Duration::from_secs(10), Duration::from_secs(300))
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_call() {
    for n in [2usize, 5, 20] {
        let coord: RequestCoordinator<usize> = RequestCoordinator::new(CacheLayer::new(16));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = DomainKey::Progress;

        let requests = (0..n).map(|_| {
            let calls = Arc::clone(&calls);
            coord.fetch_once(
                &key,
                move |_| async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(calls.fetch_add(1, Ordering::SeqCst) + 100)
                },
                options(),
            )
        });
        let results = join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "n = {n}");
        assert!(results.iter().all(|r| r.as_ref().ok() == Some(&100)));
        let stats = coord.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.coalesced, n as u64 - 1);
        assert_eq!(coord.in_flight_count(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn different_keys_do_not_coalesce() {
    let coord: RequestCoordinator<&'static str> = RequestCoordinator::new(CacheLayer::new(16));
    let september = DomainKey::monthly_snapshot("2025-09").unwrap();
    let august = DomainKey::monthly_snapshot("2025-08").unwrap();

    let (a, b) = tokio::join!(
        coord.fetch_once(&september, |_| async { Ok("sep") }, options()),
        coord.fetch_once(&august, |_| async { Ok("aug") }, options()),
    );
    assert_eq!((a.unwrap(), b.unwrap()), ("sep", "aug"));
    assert_eq!(coord.stats().started, 2);
}

#[tokio::test(start_paused = true)]
async fn stale_entry_never_satisfies_request() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));
    let ttl = FetchOptions::new(Duration::from_secs(10), Duration::from_secs(30));

    coord
        .fetch_once(&DomainKey::Risk, |_| async { Ok(1) }, ttl.clone())
        .await
        .unwrap();

    tokio::time::advance(Duration::from_millis(29_999)).await;
    let cached = coord
        .fetch_once(&DomainKey::Risk, |_| async { Ok(2) }, ttl.clone())
        .await
        .unwrap();
    assert_eq!(cached, 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    let refreshed = coord
        .fetch_once(&DomainKey::Risk, |_| async { Ok(3) }, ttl)
        .await
        .unwrap();
    assert_eq!(refreshed, 3);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_supersedes_and_discards_old_result() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));

    let first = {
        let coord = coord.clone();
        tokio::spawn(async move {
            coord
                .fetch_once(
                    &DomainKey::Manpower,
                    |_| async {
                        // ignores its signal on purpose
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(1)
                    },
                    options(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(coord.is_in_flight(&DomainKey::Manpower));

    let second = coord
        .fetch_once(
            &DomainKey::Manpower,
            |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(2)
            },
            options().forced(),
        )
        .await
        .unwrap();
    assert_eq!(second, 2);

    let first = first.await.unwrap().unwrap_err();
    assert!(first.is_cancelled());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(coord.cache().get_fresh(&DomainKey::Manpower), Some(2));
    assert_eq!(coord.stats().superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_hands_task_a_cancelled_signal() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));
    let observed = Arc::new(AtomicUsize::new(0));

    let first = {
        let coord = coord.clone();
        let observed = Arc::clone(&observed);
        tokio::spawn(async move {
            coord
                .fetch_once(
                    &DomainKey::Risk,
                    move |signal| async move {
                        signal.cancelled().await;
                        observed.fetch_add(1, Ordering::SeqCst);
                        Err(FetchError::Cancelled("aborted".to_string()))
                    },
                    options(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    coord
        .fetch_once(&DomainKey::Risk, |_| async { Ok(9) }, options().forced())
        .await
        .unwrap();

    assert!(first.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(coord.cache().get_fresh(&DomainKey::Risk), Some(9));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_classified_and_not_cached() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));
    let err = coord
        .fetch_once(
            &DomainKey::Progress,
            |_| async {
                tokio::time::sleep(Duration::from_secs(15)).await;
                Ok(1)
            },
            options(),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.retryable);
    assert!(!coord.cache().contains(&DomainKey::Progress));
    assert_eq!(coord.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn external_signal_cancels_the_task() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));
    let external = tokio_util::sync::CancellationToken::new();
    let trigger = external.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = coord
        .fetch_once(
            &DomainKey::AiInsights,
            |signal| async move {
                signal.cancelled().await;
                Err(FetchError::Cancelled("aborted".to_string()))
            },
            options().with_signal(external),
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!coord.is_in_flight(&DomainKey::AiInsights));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_empties_registry() {
    let coord: RequestCoordinator<u8> = RequestCoordinator::new(CacheLayer::new(16));
    let mut waiters = Vec::new();
    for key in DomainKey::fixed() {
        let coord = coord.clone();
        waiters.push(tokio::spawn(async move {
            coord
                .fetch_once(
                    &key,
                    |_| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(0)
                    },
                    options(),
                )
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(coord.in_flight_count(), 5);

    assert_eq!(coord.cancel_all(), 5);
    for waiter in waiters {
        assert!(waiter.await.unwrap().unwrap_err().is_cancelled());
    }
    assert_eq!(coord.cache().entry_count(), 0);
}
