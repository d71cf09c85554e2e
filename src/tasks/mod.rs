pub mod current;
pub mod fusion;

pub use current::{CurrentNode, CurrentReport, CurrentStats};
pub use fusion::{FusionBringUp, FusionNode, FusionReport, FusionStats};

use crate::drivers::{Calibrate, SensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemAlert {
    LocalSensorFailure,
    UplinkFailure,
}

/// Where a sensor ended up after bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUp {
    /// Initialized and calibrated.
    Ready,
    /// Initialized, but calibration got no samples; readings are uncorrected.
    Uncalibrated,
    /// Initialization failed; reads will keep failing.
    Failed,
}

/// Calibration only runs once initialization succeeded.
async fn bring_up_sensor<S: Calibrate>(
    sensor: &mut S,
    name: &'static str,
    samples: u32,
    reference: Option<f32>,
) -> BringUp {
    if let Err(e) = sensor.initialize().await {
        error!("{} init failed: {}", name, e.describe());
        return BringUp::Failed;
    }
    match sensor.calibrate(samples, reference).await {
        Ok(report) => {
            if report.is_partial() {
                warn!("{} calibration skipped {} of {} reads", name, report.skipped(), report.attempted);
            }
            BringUp::Ready
        }
        Err(SensorError::CalibrationIncomplete { attempted }) => {
            warn!("{} uncalibrated, all {} reads failed", name, attempted);
            BringUp::Uncalibrated
        }
        Err(e) => {
            warn!("{} calibration rejected: {}", name, e.describe());
            BringUp::Uncalibrated
        }
    }
}
