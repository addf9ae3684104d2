use std::sync::Arc;

use chrono::{Duration, Utc};

use super::{NegativeDeltaPolicy, SessionAccumulator};
use crate::types::{MessageRole, UsageSnapshot};

// ============================================================================
// Test Helpers
// ============================================================================

fn snapshot(input: u64, output: u64) -> UsageSnapshot {
    UsageSnapshot {
        input_tokens: input,
        output_tokens: output,
        ..Default::default()
    }
}

fn assistant(acc: &SessionAccumulator, session: &str, message: &str, snap: UsageSnapshot) {
    acc.apply_update(
        session,
        message,
        MessageRole::Assistant,
        snap,
        "claude-sonnet-4-5",
        "anthropic",
    );
}

// ============================================================================
// Delta accumulation
// ============================================================================

#[test]
fn test_duplicate_update_is_idempotent() {
    let once = SessionAccumulator::new();
    let twice = SessionAccumulator::new();
    let snap = UsageSnapshot {
        input_tokens: 300,
        output_tokens: 120,
        reasoning_tokens: 40,
        cache_read_tokens: 1000,
        cache_write_tokens: 50,
        cost: 0.012,
    };

    assistant(&once, "s1", "m1", snap);
    assistant(&twice, "s1", "m1", snap);
    assistant(&twice, "s1", "m1", snap);

    let a = once.session_stats("s1").expect("stats");
    let b = twice.session_stats("s1").expect("stats");
    assert_eq!(a.input_tokens, b.input_tokens);
    assert_eq!(a.output_tokens, b.output_tokens);
    assert_eq!(a.reasoning_tokens, b.reasoning_tokens);
    assert_eq!(a.cache_read_tokens, b.cache_read_tokens);
    assert_eq!(a.cache_write_tokens, b.cache_write_tokens);
    assert_eq!(a.cost, b.cost);
    assert_eq!(a.messages, 1);
    assert_eq!(b.messages, 1);
}

#[test]
fn test_cumulative_snapshots_add_only_the_difference() {
    let acc = SessionAccumulator::new();

    assistant(&acc, "s1", "m1", snapshot(0, 0));
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 0);

    assistant(&acc, "s1", "m1", snapshot(50, 0));
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 50);

    assistant(&acc, "s1", "m1", snapshot(120, 0));
    // +70, not +120
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 120);
}

#[test]
fn test_unchanged_second_update() {
    let acc = SessionAccumulator::new();

    assistant(&acc, "s1", "m1", snapshot(200, 0));
    assistant(&acc, "s1", "m1", snapshot(200, 0));

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.input_tokens, 200);
    assert_eq!(stats.messages, 1);
}

#[test]
fn test_all_fields_and_cost_accumulate() {
    let acc = SessionAccumulator::new();
    assistant(
        &acc,
        "s1",
        "m1",
        UsageSnapshot {
            input_tokens: 10,
            output_tokens: 20,
            reasoning_tokens: 30,
            cache_read_tokens: 40,
            cache_write_tokens: 50,
            cost: 0.25,
        },
    );
    assistant(
        &acc,
        "s1",
        "m2",
        UsageSnapshot {
            input_tokens: 1,
            output_tokens: 2,
            reasoning_tokens: 3,
            cache_read_tokens: 4,
            cache_write_tokens: 5,
            cost: 0.5,
        },
    );

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.input_tokens, 11);
    assert_eq!(stats.output_tokens, 22);
    assert_eq!(stats.reasoning_tokens, 33);
    assert_eq!(stats.cache_read_tokens, 44);
    assert_eq!(stats.cache_write_tokens, 55);
    assert!((stats.cost - 0.75).abs() < 1e-12);
    assert_eq!(stats.total_tokens(), 66);
}

// ============================================================================
// Message counting
// ============================================================================

#[test]
fn test_message_count_is_distinct_messages() {
    let acc = SessionAccumulator::new();
    let n = 5;
    let k = 4;

    for m in 0..n {
        for step in 1..=k {
            assistant(&acc, "s1", &format!("m{m}"), snapshot(step * 10, step));
        }
    }

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.messages, n as u32);
    assert_eq!(stats.input_tokens, (n * k * 10) as i64);
}

#[test]
fn test_same_message_id_in_different_sessions() {
    let acc = SessionAccumulator::new();

    assistant(&acc, "s1", "m1", snapshot(100, 0));
    assistant(&acc, "s2", "m1", snapshot(40, 0));

    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 100);
    assert_eq!(acc.session_stats("s2").unwrap().input_tokens, 40);
    assert_eq!(acc.session_stats("s2").unwrap().messages, 1);
    assert_eq!(acc.session_ids(), vec!["s1".to_string(), "s2".to_string()]);
}

#[test]
fn test_non_assistant_roles_are_ignored() {
    let acc = SessionAccumulator::new();

    for role in [MessageRole::User, MessageRole::Other] {
        acc.apply_update("s1", "m1", role, snapshot(500, 500), "gpt-4o", "openai");
    }

    assert!(acc.session_stats("s1").is_none());
    assert!(acc.is_empty());
}

#[test]
fn test_models_and_providers_are_sets() {
    let acc = SessionAccumulator::new();

    acc.apply_update("s1", "m1", MessageRole::Assistant, snapshot(1, 1), "gpt-4o", "openai");
    acc.apply_update("s1", "m2", MessageRole::Assistant, snapshot(1, 1), "gpt-4o", "openai");
    acc.apply_update(
        "s1",
        "m3",
        MessageRole::Assistant,
        snapshot(1, 1),
        "claude-haiku-4-5",
        "anthropic",
    );

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.model_names(), vec!["claude-haiku-4-5", "gpt-4o"]);
    assert_eq!(stats.provider_names(), vec!["anthropic", "openai"]);
}

#[test]
fn test_snapshot_is_replaced() {
    let acc = SessionAccumulator::new();

    assistant(&acc, "s1", "m1", snapshot(10, 1));
    assistant(&acc, "s1", "m1", snapshot(30, 7));

    assert_eq!(acc.message_snapshot("s1", "m1"), Some(snapshot(30, 7)));
    assert_eq!(acc.message_snapshot("s1", "m2"), None);
}

// ============================================================================
// Non-monotonic snapshots
// ============================================================================

#[test]
fn test_unclamped_policy_lets_totals_go_down() {
    let acc = SessionAccumulator::new();

    assistant(&acc, "s1", "m1", snapshot(100, 50));
    assistant(&acc, "s1", "m1", snapshot(60, 50));

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.input_tokens, 60);
    assert_eq!(stats.messages, 1);

    // The smaller snapshot is the new baseline
    assistant(&acc, "s1", "m1", snapshot(100, 50));
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 100);
}

#[test]
fn test_clamped_policy_ignores_decreases() {
    let acc = SessionAccumulator::with_policy(NegativeDeltaPolicy::Clamped);

    assistant(&acc, "s1", "m1", snapshot(100, 50));
    assistant(&acc, "s1", "m1", snapshot(60, 80));

    let stats = acc.session_stats("s1").unwrap();
    assert_eq!(stats.input_tokens, 100);
    assert_eq!(stats.output_tokens, 80);

    // Baseline still moves to the latest snapshot, so growth is counted from 60
    assistant(&acc, "s1", "m1", snapshot(100, 80));
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 140);
}

#[test]
fn test_clamped_policy_on_cost() {
    let acc = SessionAccumulator::with_policy(NegativeDeltaPolicy::Clamped);

    let mut first = snapshot(10, 10);
    first.cost = 0.5;
    let mut retried = snapshot(10, 10);
    retried.cost = 0.2;

    assistant(&acc, "s1", "m1", first);
    assistant(&acc, "s1", "m1", retried);

    assert!((acc.session_stats("s1").unwrap().cost - 0.5).abs() < 1e-12);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_end_session_removes_stats_and_snapshots() {
    let acc = SessionAccumulator::new();
    assistant(&acc, "s1", "m1", snapshot(100, 0));
    assistant(&acc, "s2", "m1", snapshot(100, 0));

    let final_stats = acc.end_session("s1").expect("known session");
    assert_eq!(final_stats.input_tokens, 100);
    assert!(acc.session_stats("s1").is_none());
    assert!(acc.message_snapshot("s1", "m1").is_none());
    assert_eq!(acc.len(), 1);

    assert!(acc.end_session("s1").is_none());

    // A re-used id starts from scratch
    assistant(&acc, "s1", "m1", snapshot(100, 0));
    assert_eq!(acc.session_stats("s1").unwrap().messages, 1);
    assert_eq!(acc.session_stats("s1").unwrap().input_tokens, 100);
}

#[test]
fn test_evict_idle_sessions() {
    let acc = SessionAccumulator::new();
    assistant(&acc, "s1", "m1", snapshot(1, 1));
    assistant(&acc, "s2", "m1", snapshot(1, 1));

    let now = Utc::now();
    assert_eq!(acc.evict_idle(Duration::minutes(30), now), 0);
    assert_eq!(acc.len(), 2);

    let later = now + Duration::hours(2);
    assert_eq!(acc.evict_idle(Duration::minutes(30), later), 2);
    assert!(acc.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_updates_to_one_session() {
    let acc = Arc::new(SessionAccumulator::new());
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let acc = Arc::clone(&acc);
            std::thread::spawn(move || {
                for step in 1..=50u64 {
                    assistant(&acc, "shared", &format!("t{t}"), snapshot(step, 0));
                }
            })
        })
        .collect();

    for handle in threads {
        handle.join().expect("worker thread");
    }

    let stats = acc.session_stats("shared").unwrap();
    assert_eq!(stats.messages, 8);
    assert_eq!(stats.input_tokens, 8 * 50);
}
