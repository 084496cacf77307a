//! Latency-based scoring for correct answers.

/// Maximum points, awarded at or under [`FAST_THRESHOLD_MS`].
pub const MAX_POINTS: u32 = 1000;
/// Minimum points for a correct answer inside the time limit.
pub const MIN_POINTS: u32 = 250;
/// Latency under which no decay applies, milliseconds.
pub const FAST_THRESHOLD_MS: u64 = 1000;

/// Points for a correct answer submitted `response_ms` after the question
/// opened, with `time_limit_ms` being the nominal answer window.
///
/// Answers at or under one second score full points; from there the award
/// decays linearly down to [`MIN_POINTS`] at the time limit. Past the limit
/// the answer scores nothing, even when the grace buffer let it through.
pub fn score_for_response(response_ms: u64, time_limit_ms: u64) -> u32 {
    if response_ms > time_limit_ms {
        return 0;
    }
    if response_ms <= FAST_THRESHOLD_MS || time_limit_ms <= FAST_THRESHOLD_MS {
        return MAX_POINTS;
    }

    let span = u64::from(MAX_POINTS - MIN_POINTS);
    let decay = (response_ms - FAST_THRESHOLD_MS) * span / (time_limit_ms - FAST_THRESHOLD_MS);
    MAX_POINTS - decay as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 15_000;

    #[test]
    fn fast_answers_score_full_points() {
        assert_eq!(score_for_response(0, LIMIT), 1000);
        assert_eq!(score_for_response(400, LIMIT), 1000);
        assert_eq!(score_for_response(1000, LIMIT), 1000);
    }

    #[test]
    fn decay_is_linear_between_threshold_and_limit() {
        // Midpoint of the decay span: 8000ms into a 15s window.
        assert_eq!(score_for_response(8_000, LIMIT), 625);
        assert_eq!(score_for_response(15_000, LIMIT), 250);
    }

    #[test]
    fn answers_past_the_limit_score_zero() {
        assert_eq!(score_for_response(15_001, LIMIT), 0);
        // Grace-buffer submissions are recorded but unrewarded.
        assert_eq!(score_for_response(15_900, LIMIT), 0);
    }

    #[test]
    fn score_never_increases_with_latency() {
        let mut previous = u32::MAX;
        for response in (0..=LIMIT).step_by(250) {
            let score = score_for_response(response, LIMIT);
            assert!(score <= previous, "score rose at {response}ms");
            previous = score;
        }
    }

    #[test]
    fn degenerate_window_awards_full_points() {
        assert_eq!(score_for_response(500, 800), 1000);
    }
}
