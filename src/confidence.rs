//! Confidence scoring from reported GPS accuracy.
//!
//! Per point: 5 m or better scores 100, 30 m or worse scores 0, linear in
//! between (`100 - (accuracy - 5) * 4`, with the penalty truncated). A session scores the mean of its
//! recent points' scores; with no points it scores 100.

const FULL_CONFIDENCE_ACCURACY_M: f64 = 5.0;
const ZERO_CONFIDENCE_ACCURACY_M: f64 = 30.0;
const POINTS_PER_METER: f64 = 4.0;

/// Score a single accuracy reading, 0-100.
pub fn point_confidence(accuracy: f64) -> u8 {
    if accuracy.is_nan() {
        return 0;
    }
    if accuracy <= FULL_CONFIDENCE_ACCURACY_M {
        return 100;
    }
    if accuracy >= ZERO_CONFIDENCE_ACCURACY_M {
        return 0;
    }
    let penalty = (accuracy - FULL_CONFIDENCE_ACCURACY_M) * POINTS_PER_METER;
    100 - (penalty.clamp(0.0, 100.0) as u8)
}

/// Mean score over a set of accuracy readings, truncated to an integer.
///
/// An empty set is optimistic: no evidence of poor signal scores 100.
pub fn session_confidence<I>(accuracies: I) -> u8
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = accuracies
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), acc| {
            (sum + point_confidence(acc) as u32, count + 1)
        });
    if count == 0 {
        return 100;
    }
    (sum / count) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_confidence_breakpoints() {
        assert_eq!(point_confidence(0.0), 100);
        assert_eq!(point_confidence(5.0), 100);
        assert_eq!(point_confidence(30.0), 0);
        assert_eq!(point_confidence(120.0), 0);
    }

    #[test]
    fn test_point_confidence_midpoint() {
        let mid = point_confidence(17.5);
        assert!((49..=51).contains(&mid), "got {}", mid);
        assert_eq!(point_confidence(10.0), 80);
    }

    #[test]
    fn test_point_confidence_truncates_penalty() {
        // Penalty 0.4 truncates to 0
        assert_eq!(point_confidence(5.1), 100);
        // Penalty 9.2 truncates to 9
        assert_eq!(point_confidence(7.3), 91);
        assert_eq!(point_confidence(29.9), 1);
    }

    #[test]
    fn test_point_confidence_monotonic() {
        let mut prev = 100;
        for tenth in 0..400 {
            let score = point_confidence(tenth as f64 / 10.0);
            assert!(score <= prev);
            prev = score;
        }
    }

    #[test]
    fn test_session_confidence() {
        assert_eq!(session_confidence(Vec::<f64>::new()), 100);
        assert_eq!(session_confidence(vec![1.0, 2.0]), 100);
        // (100 + 0) / 2
        assert_eq!(session_confidence(vec![5.0, 30.0]), 50);
        // (100 + 80 + 0) / 3 = 60
        assert_eq!(session_confidence(vec![3.0, 10.0, 40.0]), 60);
    }
}
