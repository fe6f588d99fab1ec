//! Admission control: throttle, debounce, random drop.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use charade_core::config::ThrottleConfig;
use charade_sessions::ThrottleState;

/// Outcome of the admission check for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed toward completion.
    Process,
    /// Inside the throttle window but addressed to the persona: re-evaluate
    /// after the remaining wait.
    Defer(Duration),
    /// Discard the message.
    Drop,
}

/// Decide admission for a message arriving at `now`.
///
/// The throttle interval is `base_interval + uniform(min_jitter, max_jitter)`,
/// drawn fresh per check. Inside the window only addressed-to-self messages
/// survive, as a deferral; outside it, non-addressed messages additionally
/// face one independent drop draw with the configured probability.
///
/// `last_admitted_at` is NOT updated here — the caller records it right
/// before the completion call starts, so that non-completing turns never
/// consume the window.
pub fn admit(
    state: &ThrottleState,
    config: &ThrottleConfig,
    addressed_to_self: bool,
    now: Instant,
) -> Admission {
    let mut rng = rand::rng();
    let jitter = if config.max_jitter_ms > config.min_jitter_ms {
        rng.random_range(config.min_jitter_ms..=config.max_jitter_ms)
    } else {
        config.min_jitter_ms
    };
    let interval = Duration::from_millis(config.base_interval_ms + jitter);

    if let Some(last) = state.last_admitted_at {
        let elapsed = now.saturating_duration_since(last);
        if elapsed < interval {
            return if addressed_to_self {
                Admission::Defer(interval - elapsed)
            } else {
                Admission::Drop
            };
        }
    }

    if !addressed_to_self
        && config.drop_probability > 0.0
        && rng.random::<f64>() < config.drop_probability
    {
        return Admission::Drop;
    }

    Admission::Process
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, min_jitter: u64, max_jitter: u64, p: f64) -> ThrottleConfig {
        ThrottleConfig {
            base_interval_ms: base,
            min_jitter_ms: min_jitter,
            max_jitter_ms: max_jitter,
            drop_probability: p,
        }
    }

    #[test]
    fn first_message_is_admitted() {
        let state = ThrottleState::new();
        let cfg = config(10_000, 0, 0, 0.0);
        assert_eq!(admit(&state, &cfg, false, Instant::now()), Admission::Process);
    }

    #[test]
    fn inside_window_self_addressed_defers_with_remaining_wait() {
        let now = Instant::now();
        let mut state = ThrottleState::new();
        state.mark_admitted(now);
        let cfg = config(10_000, 0, 0, 0.0);

        let later = now + Duration::from_secs(1);
        match admit(&state, &cfg, true, later) {
            Admission::Defer(wait) => assert_eq!(wait, Duration::from_secs(9)),
            other => panic!("expected Defer, got {other:?}"),
        }
    }

    #[test]
    fn inside_window_others_drop() {
        let now = Instant::now();
        let mut state = ThrottleState::new();
        state.mark_admitted(now);
        let cfg = config(10_000, 0, 0, 0.0);
        let later = now + Duration::from_secs(1);
        assert_eq!(admit(&state, &cfg, false, later), Admission::Drop);
    }

    #[test]
    fn window_never_shorter_than_base_plus_min_jitter() {
        // With jitter in [3s, 5s] and base 10s, any check before 13s must
        // defer or drop, across many randomized draws.
        let now = Instant::now();
        let mut state = ThrottleState::new();
        state.mark_admitted(now);
        let cfg = config(10_000, 3_000, 5_000, 0.0);
        let just_before = now + Duration::from_millis(12_999);
        for _ in 0..200 {
            assert_ne!(admit(&state, &cfg, false, just_before), Admission::Process);
        }
    }

    #[test]
    fn random_drop_applies_only_to_non_addressed() {
        let state = ThrottleState::new();
        let cfg = config(0, 0, 0, 1.0);
        let now = Instant::now();
        for _ in 0..50 {
            assert_eq!(admit(&state, &cfg, false, now), Admission::Drop);
            assert_eq!(admit(&state, &cfg, true, now), Admission::Process);
        }
    }

    #[test]
    fn elapsed_window_admits_again() {
        let now = Instant::now();
        let mut state = ThrottleState::new();
        state.mark_admitted(now);
        let cfg = config(10_000, 0, 0, 0.0);
        let later = now + Duration::from_secs(10);
        assert_eq!(admit(&state, &cfg, false, later), Admission::Process);
    }
}
