//! Affine sensor model: `corrected = (raw - bias) / scale`.
//!
//! Biases are derived once from a batch of stationary samples. Failed reads
//! inside a batch are skipped, not counted, so the mean only covers samples
//! that actually arrived.

/// Per-channel bias/scale correction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AffineCalibration {
    pub bias: f32,
    pub scale: f32,
}

impl AffineCalibration {
    pub const IDENTITY: Self = Self::new(0.0, 1.0);

    pub const fn new(bias: f32, scale: f32) -> Self {
        Self { bias, scale }
    }

    /// Zero bias with a fixed sensitivity, e.g. LSB per g.
    pub const fn scaled(scale: f32) -> Self {
        Self::new(0.0, scale)
    }

    /// Derives the bias from the averaged raw value observed while the sensor
    /// sat at a known reference, keeping the current scale.
    pub fn rebias(self, mean_raw: f32, expected_raw_at_reference: f32) -> Self {
        Self {
            bias: mean_raw - expected_raw_at_reference,
            scale: self.scale,
        }
    }

    #[inline]
    pub fn apply(&self, raw: f32) -> f32 {
        (raw - self.bias) / self.scale
    }
}

impl Default for AffineCalibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How a calibration batch went. Only produced when at least one sample
/// arrived; an empty batch is reported as
/// [`SensorError::CalibrationIncomplete`](crate::drivers::SensorError).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationReport {
    pub accepted: u32,
    pub attempted: u32,
}

impl CalibrationReport {
    pub fn skipped(&self) -> u32 {
        self.attempted - self.accepted
    }

    pub fn is_partial(&self) -> bool {
        self.accepted < self.attempted
    }
}

/// Running sums for an `N`-channel calibration batch.
#[derive(Debug, Clone)]
pub struct CalibrationAccumulator<const N: usize> {
    sums: [f64; N],
    accepted: u32,
    attempted: u32,
}

impl<const N: usize> CalibrationAccumulator<N> {
    pub const fn new() -> Self {
        Self {
            sums: [0.0; N],
            accepted: 0,
            attempted: 0,
        }
    }

    pub fn push(&mut self, sample: [f32; N]) {
        for (sum, value) in self.sums.iter_mut().zip(sample) {
            *sum += value as f64;
        }
        self.accepted += 1;
        self.attempted += 1;
    }

    /// Records a failed read.
    pub fn skip(&mut self) {
        self.attempted += 1;
    }

    pub fn attempted(&self) -> u32 {
        self.attempted
    }

    /// Mean over accepted samples, `None` when nothing arrived.
    pub fn mean(&self) -> Option<[f32; N]> {
        if self.accepted == 0 {
            return None;
        }
        let n = self.accepted as f64;
        Some(self.sums.map(|sum| (sum / n) as f32))
    }

    pub fn report(&self) -> CalibrationReport {
        CalibrationReport {
            accepted: self.accepted,
            attempted: self.attempted,
        }
    }
}

impl<const N: usize> Default for CalibrationAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}
