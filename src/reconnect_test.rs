use super::*;

#[test]
fn default_schedule_doubles_then_caps_at_ten_seconds() {
    let policy = ReconnectPolicy::default();
    let delays = (0..5)
        .map(|n| policy.delay_for(n).expect("attempt within budget").as_millis())
        .collect::<Vec<_>>();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000]);
}

#[test]
fn no_sixth_attempt() {
    let policy = ReconnectPolicy::default();
    assert!(policy.delay_for(5).is_none());
    assert!(policy.delay_for(6).is_none());
}

#[test]
fn huge_attempt_numbers_saturate_instead_of_overflowing() {
    let policy = ReconnectPolicy { max_attempts: u32::MAX, ..ReconnectPolicy::default() };
    assert_eq!(policy.delay_for(40), Some(Duration::from_millis(DEFAULT_RECONNECT_MAX_MS)));
}

#[test]
fn zero_budget_never_reconnects() {
    let policy = ReconnectPolicy { max_attempts: 0, ..ReconnectPolicy::default() };
    assert!(policy.delay_for(0).is_none());
}
