//! Speed estimation
//!
//! Pixel displacement between two retained frames converted to km/h, plus the
//! moving-average window each track keeps over those samples.

use std::collections::VecDeque;

use crate::config::SpeedConfig;

/// Metres per second to kilometres per hour
const MPS_TO_KMH: f64 = 3.6;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Speed in km/h between two track positions
///
/// `effective_fps` is the rate between the two samples, i.e. the nominal rate
/// divided by the frame-skip factor. Returns 0 on first sighting and for
/// displacements under the noise gate.
pub fn estimate_speed(
    prev: Option<(f32, f32)>,
    curr: (f32, f32),
    effective_fps: f64,
    settings: &SpeedConfig,
) -> f64 {
    let Some((px, py)) = prev else {
        return 0.0;
    };

    let dx = (curr.0 - px) as f64;
    let dy = (curr.1 - py) as f64;
    let pixel_dist = (dx * dx + dy * dy).sqrt();

    // Detector jitter on parked vehicles
    if pixel_dist < settings.noise_gate_px {
        return 0.0;
    }

    let mps = pixel_dist * settings.pixel_scale * effective_fps;
    round2(mps * MPS_TO_KMH)
}

/// Bounded moving average over recent speed samples
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest beyond capacity, and return the mean
    pub fn push(&mut self, sample: f64) -> f64 {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.mean()
    }

    /// Mean of the held samples, rounded to two decimals
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        round2(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_is_zero() {
        let speed = estimate_speed(None, (100.0, 100.0), 10.0, &SpeedConfig::default());
        assert_eq!(speed, 0.0);
    }

    #[test]
    fn test_noise_gate_ignores_fps() {
        let settings = SpeedConfig::default();
        for fps in [1.0, 10.0, 30.0, 240.0] {
            assert_eq!(estimate_speed(Some((0.0, 0.0)), (3.0, 3.9), fps, &settings), 0.0);
            assert_eq!(estimate_speed(Some((10.0, 10.0)), (10.0, 10.0), fps, &settings), 0.0);
        }
    }

    #[test]
    fn test_fifty_pixels_at_ten_fps() {
        let speed = estimate_speed(Some((100.0, 100.0)), (150.0, 100.0), 10.0, &SpeedConfig::default());
        assert!((speed - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_skipped_frames_scale_elapsed_time() {
        let settings = SpeedConfig::default();
        let nominal = estimate_speed(Some((0.0, 0.0)), (30.0, 40.0), 30.0, &settings);
        let effective = estimate_speed(Some((0.0, 0.0)), (30.0, 40.0), 10.0, &settings);
        assert!((nominal - effective * 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = SpeedWindow::new(5);
        for sample in [100.0, 0.0, 0.0, 0.0, 0.0] {
            window.push(sample);
        }
        assert!((window.mean() - 20.0).abs() < 1e-9);

        let mean = window.push(0.0);
        assert_eq!(window.len(), 5);
        assert_eq!(mean, 0.0);
    }

    #[test]
    fn test_window_mean_rounded() {
        let mut window = SpeedWindow::new(5);
        window.push(10.0);
        window.push(10.0);
        let mean = window.push(11.0);
        assert!((mean - 10.33).abs() < 1e-9);
    }
}
