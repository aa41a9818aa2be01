//! Sleeper-agent detection
//!
//! A sleeper agent behaves modestly to accumulate standing, then spikes
//! its reported trust right before attacking. The detector scans the
//! historical ring for any pair of samples showing a rise of at least
//! `sleeper_spike_threshold` within `sleeper_window_ticks`, without the
//! node holding authority status. Penalty application lives in the store
//! (`flag_sleeper`): 50% trust cut plus an election ban.

use std::collections::VecDeque;

/// Scan the historical ring for a trust spike. Returns the largest
/// qualifying rise, or `None` when the ring shows no spike.
pub fn detect_spike(
    samples: &VecDeque<(u64, f64)>,
    window_ticks: u64,
    threshold: f64,
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (i, &(tick_i, value_i)) in samples.iter().enumerate() {
        for &(tick_j, value_j) in samples.iter().skip(i + 1) {
            if tick_j.saturating_sub(tick_i) > window_ticks {
                continue;
            }
            let rise = value_j - value_i;
            if rise >= threshold {
                best = Some(best.map_or(rise, |b: f64| b.max(rise)));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(values: &[(u64, f64)]) -> VecDeque<(u64, f64)> {
        values.iter().copied().collect()
    }

    #[test]
    fn gradual_growth_is_not_a_spike() {
        let samples = ring(&[
            (0, 0.40),
            (1, 0.42),
            (2, 0.41),
            (3, 0.43),
            (4, 0.45),
            (5, 0.44),
            (6, 0.46),
            (7, 0.48),
        ]);
        assert_eq!(detect_spike(&samples, 10, 0.30), None);
    }

    #[test]
    fn sudden_jump_is_detected() {
        let samples = ring(&[
            (0, 0.40),
            (1, 0.42),
            (2, 0.41),
            (3, 0.43),
            (4, 0.45),
            (5, 0.44),
            (6, 0.46),
            (7, 0.48),
            (8, 0.90),
        ]);
        let spike = detect_spike(&samples, 10, 0.30).unwrap();
        assert!((spike - 0.50).abs() < 1e-12);
    }

    #[test]
    fn jump_outside_the_window_does_not_count() {
        let samples = ring(&[(0, 0.40), (30, 0.90)]);
        assert_eq!(detect_spike(&samples, 10, 0.30), None);
        // Same rise inside the window does count
        let samples = ring(&[(0, 0.40), (10, 0.90)]);
        assert!(detect_spike(&samples, 10, 0.30).is_some());
    }

    #[test]
    fn empty_ring_is_clean() {
        assert_eq!(detect_spike(&VecDeque::new(), 10, 0.30), None);
    }
}
