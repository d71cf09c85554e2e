pub mod current;
pub mod mpu6500;
pub mod sht30;

pub use current::{AnalogInput, PhaseRms, ThreePhaseCurrent};
pub use mpu6500::{Mpu6500, RawAccel};
pub use sht30::Sht30;

use crate::calibration::CalibrationReport;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/* ------------------------------------------------------------------------- */
/*  Error enum                                                               */
/* ------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError<E> {
    /// Bus transaction failed; outputs and filter state are untouched.
    Bus(E),
    /// Reply arrived but its checksum did not match.
    Crc,
    /// A fixed parameter the driver depends on is unusable.
    InvalidConfig,
    /// Every read in a calibration batch failed; the previous calibration
    /// is still in place.
    CalibrationIncomplete { attempted: u32 },
}

impl<E> SensorError<E> {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Bus(_) => "bus transaction failed",
            Self::Crc => "checksum mismatch",
            Self::InvalidConfig => "invalid configuration",
            Self::CalibrationIncomplete { .. } => "calibration incomplete",
        }
    }
}

impl<E> From<E> for SensorError<E> {
    fn from(e: E) -> Self {
        Self::Bus(e)
    }
}

/// Capability set every sensor front end exposes.
///
/// `read_calibrated` is `read_raw` followed by the affine correction and then
/// the driver's smoothing filter, in that order. A failed `read_raw` returns
/// before the filter is touched.
#[allow(async_fn_in_trait)]
pub trait SensorDriver {
    type Raw;
    type Reading;
    type Error;

    /// Fixed configuration sequence. No retries; the caller decides whether
    /// a failure is fatal.
    async fn initialize(&mut self) -> Result<(), SensorError<Self::Error>>;

    async fn read_raw(&mut self) -> Result<Self::Raw, SensorError<Self::Error>>;

    /// Usable before calibration; the output is then simply uncorrected.
    async fn read_calibrated(&mut self) -> Result<Self::Reading, SensorError<Self::Error>>;
}

/// Stationary-reference calibration, `calibrate(samples, reference?)`.
#[allow(async_fn_in_trait)]
pub trait Calibrate: SensorDriver {
    /// Averages `samples` raw reads, skipping failures, and re-derives the
    /// bias against `reference`. If nothing could be read the previous
    /// calibration is kept and `CalibrationIncomplete` is returned.
    async fn calibrate(
        &mut self,
        samples: u32,
        reference: Option<f32>,
    ) -> Result<CalibrationReport, SensorError<Self::Error>>;
}
