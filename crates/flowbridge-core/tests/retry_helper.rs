use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use flowbridge_core::models::{CoreError, CoreErrorKind};
use flowbridge_core::monitor::{RetryPolicy, with_retry};

#[tokio::test]
async fn succeeds_on_third_attempt() {
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<&str, String> = with_retry(
        move || async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                Err(format!("attempt {attempt} failed"))
            } else {
                Ok("done")
            }
        },
        3,
        Duration::from_millis(1),
    )
    .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_attempts_return_last_error() {
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<(), String> = with_retry(
        move || async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("attempt {attempt} failed"))
        },
        3,
        Duration::from_millis(1),
    )
    .await;

    assert_eq!(result, Err("attempt 3 failed".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn zero_attempts_still_calls_once() {
    let calls = AtomicU32::new(0);
    let counter = &calls;

    let result: Result<(), &str> = with_retry(
        move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        },
        0,
        Duration::ZERO,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn policy_gives_up_on_non_retryable_errors() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let policy = RetryPolicy::fixed(5, Duration::from_millis(1));

    let error = policy
        .run(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(CoreError::new(CoreErrorKind::Validation, "bad input"))
        })
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Validation);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn policy_retries_transport_errors() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let policy = RetryPolicy::fixed(4, Duration::from_millis(1));

    let value = policy
        .run(move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::new(CoreErrorKind::Connection, "refused"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
