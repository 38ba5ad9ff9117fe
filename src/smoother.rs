//! Moving-average correction of accepted fixes.
//!
//! The smoother keeps the last `window` accepted track points. A new fix is
//! corrected to the mean latitude/longitude of the newest `window - 1` points
//! plus itself; timestamp, accuracy and speed pass through unchanged.

use crate::ring_buffer::RingBuffer;
use crate::{Fix, TrackPoint};

/// Bounded trailing-window smoother.
#[derive(Debug, Clone)]
pub struct PointSmoother {
    window: RingBuffer<TrackPoint>,
}

impl Default for PointSmoother {
    fn default() -> Self {
        Self::new(3)
    }
}

impl PointSmoother {
    /// Create a smoother averaging `window` points including the new one.
    pub fn new(window: usize) -> Self {
        Self {
            window: RingBuffer::new(window),
        }
    }

    /// Corrected copy of `fix`. Does not modify the window.
    pub fn smooth(&self, fix: &Fix) -> Fix {
        let prior = self.window.capacity() - 1;
        let mut lat_sum = fix.latitude;
        let mut lng_sum = fix.longitude;
        let mut count = 1usize;

        for p in self.window.iter().rev().take(prior) {
            lat_sum += p.latitude;
            lng_sum += p.longitude;
            count += 1;
        }

        Fix {
            latitude: lat_sum / count as f64,
            longitude: lng_sum / count as f64,
            ..*fix
        }
    }

    /// Record an accepted point, evicting the oldest once full.
    pub fn push(&mut self, point: TrackPoint) {
        self.window.push(point);
    }

    /// Rebuild the window from a session's stored points (oldest first).
    pub fn restore<'a, I>(&mut self, points: I)
    where
        I: IntoIterator<Item = &'a TrackPoint>,
    {
        self.window.clear();
        self.window.extend(points.into_iter().cloned());
    }

    /// Last accepted point, used as the filter's reference.
    pub fn last(&self) -> Option<&TrackPoint> {
        self.window.newest()
    }

    /// Points currently in the window, oldest first.
    pub fn window(&self) -> impl DoubleEndedIterator<Item = &TrackPoint> + '_ {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64, ts: i64) -> TrackPoint {
        TrackPoint::from_fix("s", &Fix::new(lat, lng, ts, 1.0))
    }

    #[test]
    fn test_smoothing_averages_points() {
        let mut smoother = PointSmoother::new(3);
        smoother.push(point(10.0, 10.0, 1));
        smoother.push(point(11.0, 11.0, 2));

        let smoothed = smoother.smooth(&Fix::new(12.0, 12.0, 3, 1.0));
        // Average of (10, 11, 12) = 11
        assert!((smoothed.latitude - 11.0).abs() < 0.01);
        assert!((smoothed.longitude - 11.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_window_passes_through() {
        let smoother = PointSmoother::default();
        let fix = Fix::new(12.0, 12.0, 3, 1.0).with_speed(1.5);
        assert_eq!(smoother.smooth(&fix), fix);
    }

    #[test]
    fn test_single_prior_point_gives_midpoint() {
        let mut smoother = PointSmoother::new(3);
        smoother.push(point(51.5007, -0.1246, 1_000));
        let smoothed = smoother.smooth(&Fix::new(51.5007, -0.1250, 2_000, 1.0));
        assert!((smoothed.longitude - (-0.1248)).abs() < 1e-9);
    }

    #[test]
    fn test_oldest_excluded_once_full() {
        let mut smoother = PointSmoother::new(3);
        smoother.push(point(0.0, 0.0, 1));
        smoother.push(point(3.0, 3.0, 2));
        smoother.push(point(6.0, 6.0, 3));

        // Only the newest two priors (3, 6) join the new point (9)
        let smoothed = smoother.smooth(&Fix::new(9.0, 9.0, 4, 1.0));
        assert!((smoothed.latitude - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_other_fields_pass_through() {
        let mut smoother = PointSmoother::new(3);
        smoother.push(point(1.0, 1.0, 1));
        let fix = Fix::new(2.0, 2.0, 77, 4.5).with_speed(1.1);
        let smoothed = smoother.smooth(&fix);
        assert_eq!(smoothed.timestamp, 77);
        assert_eq!(smoothed.accuracy, 4.5);
        assert_eq!(smoothed.speed, Some(1.1));
    }

    #[test]
    fn test_window_of_one_disables_smoothing() {
        let mut smoother = PointSmoother::new(1);
        smoother.push(point(1.0, 1.0, 1));
        let fix = Fix::new(2.0, 2.0, 2, 1.0);
        assert_eq!(smoother.smooth(&fix), fix);
    }

    #[test]
    fn test_restore_keeps_tail() {
        let points: Vec<TrackPoint> = (0..6).map(|i| point(i as f64, 0.0, i)).collect();
        let mut smoother = PointSmoother::new(3);
        smoother.restore(&points);
        assert_eq!(smoother.len(), 3);
        assert_eq!(smoother.last().unwrap().timestamp, 5);
        assert_eq!(smoother.window().next().unwrap().timestamp, 3);
    }
}
