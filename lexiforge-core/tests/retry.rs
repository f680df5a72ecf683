use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use lexiforge_core::{
    backoff_delay, retry_with_policy, AttemptOutcome, LexiforgeError, RetryPolicy,
};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(4))
}

async fn flaky(failures_before_success: u32, max_attempts: u32) -> (Result<u32, LexiforgeError>, u32) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let result = retry_with_policy(&fast_policy(max_attempts), |attempt| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if attempt <= failures_before_success {
                AttemptOutcome::Retryable(LexiforgeError::transport("mock", "transient"))
            } else {
                AttemptOutcome::Success(attempt)
            }
        }
    })
    .await
    .map(|retried| retried.value);
    (result, calls.load(Ordering::SeqCst))
}

#[tokio::test]
async fn succeeds_iff_failures_fewer_than_budget() {
    for max_attempts in 1..=4u32 {
        for failures in 0..=5u32 {
            let (result, calls) = flaky(failures, max_attempts).await;
            assert_eq!(
                result.is_ok(),
                failures < max_attempts,
                "k={failures} n={max_attempts}"
            );
            assert_eq!(calls, (failures + 1).min(max_attempts));
        }
    }
}

#[tokio::test]
async fn exhaustion_wraps_last_error_with_attempt_count() {
    let (result, _) = flaky(10, 3).await;
    let err = result.unwrap_err();
    match &err {
        LexiforgeError::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**source, LexiforgeError::Transport { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with("Gave up after 3 attempt(s)"));
}

#[tokio::test]
async fn fatal_outcome_skips_remaining_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let err = retry_with_policy(&fast_policy(5), |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::<()>::Fatal(LexiforgeError::QuotaExhausted {
                provider: "deepl".to_string(),
                message: "monthly character limit reached".to_string(),
            })
        }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, LexiforgeError::QuotaExhausted { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_attempt_policy_is_a_configuration_error() {
    let err = retry_with_policy(&RetryPolicy::new(0), |_| async {
        AttemptOutcome::Success(())
    })
    .await
    .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test(start_paused = true)]
async fn sleeps_follow_the_backoff_schedule() {
    let policy = RetryPolicy::new(4)
        .with_base_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3));
    let started = tokio::time::Instant::now();
    let _ = retry_with_policy(&policy, |_| async {
        AttemptOutcome::<()>::Retryable(LexiforgeError::transport("mock", "down"))
    })
    .await;
    // 1s + 2s + 3s (capped)
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}

#[test]
fn backoff_is_non_decreasing_and_capped() {
    let base = Duration::from_millis(250);
    let max = Duration::from_secs(10);
    let mut previous = Duration::ZERO;
    for attempt in 1..=64u32 {
        let delay = backoff_delay(base, max, attempt);
        assert!(delay >= previous);
        assert!(delay <= max);
        let uncapped = base.as_millis() * 2u128.pow((attempt - 1).min(40));
        assert_eq!(delay.as_millis(), uncapped.min(max.as_millis()));
        previous = delay;
    }
}

#[test]
fn delay_for_reports_the_unjittered_schedule() {
    let policy = RetryPolicy::default().with_jitter(true);
    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(10), Duration::from_secs(30));
}
