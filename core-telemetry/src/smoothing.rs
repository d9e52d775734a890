//! Consumer-side smoothing for jittery gauges.

/// Exponentially weighted average of the last `window` samples.
///
/// Samples are given oldest first and weighted with `alpha = 2 / (n + 1)`,
/// so the newest counts most. Zero samples are dropped when the window
/// holds at least one non-zero sample: a missed reading shows up as `0`
/// and would otherwise drag the line down. Returns `None` for an empty
/// input or a zero window.
pub fn weighted_ema(samples: &[f64], window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    let recent = &samples[samples.len().saturating_sub(window)..];
    let finite: Vec<f64> = recent.iter().copied().filter(|v| v.is_finite()).collect();

    let kept: Vec<f64> = if finite.iter().any(|v| *v != 0.0) {
        finite.into_iter().filter(|v| *v != 0.0).collect()
    } else {
        finite
    };

    let (first, rest) = kept.split_first()?;
    let alpha = 2.0 / (kept.len() as f64 + 1.0);
    Some(
        rest.iter()
            .fold(*first, |ema, value| alpha * value + (1.0 - alpha) * ema),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(weighted_ema(&[], 5), None);
        assert_eq!(weighted_ema(&[1.0], 0), None);
    }

    #[test]
    fn test_single_sample() {
        assert_eq!(weighted_ema(&[42.0], 5), Some(42.0));
    }

    #[test]
    fn test_constant_series() {
        assert_eq!(weighted_ema(&[10.0, 10.0, 10.0], 3), Some(10.0));
    }

    #[test]
    fn test_newest_weighs_most() {
        // alpha = 0.5: 2 -> 6 -> 13
        let value = weighted_ema(&[2.0, 10.0, 20.0], 3).unwrap();
        assert!((value - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_zeros_dropped_when_signal_present() {
        let value = weighted_ema(&[0.0, 8.0, 0.0, 8.0], 4).unwrap();
        assert!((value - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_stays_zero() {
        assert_eq!(weighted_ema(&[0.0, 0.0], 2), Some(0.0));
    }

    #[test]
    fn test_only_last_window_samples() {
        let value = weighted_ema(&[100.0, 100.0, 4.0, 4.0], 2).unwrap();
        assert!((value - 4.0).abs() < 1e-9);
    }
}
