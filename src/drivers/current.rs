//! Three-phase current front end: CT clamps into ADC pins.
//!
//! Each read is an independent window of `window_samples` readings per phase
//! taken `sample_delay_us` apart. The DC bias of the burden circuit is removed
//! by taking the standard deviation of the window (AC RMS). Nothing carries
//! over between windows.

use embedded_hal_async::delay::DelayNs;

use super::{SensorDriver, SensorError};
use crate::calibration::AffineCalibration;
use crate::config::CurrentSenseConfig;
use crate::packet::CurrentPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcAttenuation {
    Db0,
    Db2_5,
    Db6,
    Db11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    pub width_bits: u8,
    pub attenuation: AdcAttenuation,
}

/// One analog pin, already compensated to millivolts by the platform.
pub trait AnalogInput {
    type Error;

    fn configure(&mut self, config: &AdcConfig) -> Result<(), Self::Error>;

    fn read_millivolts(&mut self) -> Result<u16, Self::Error>;
}

/// Single-pass mean/variance (Welford), so the window needs no buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningRms {
    count: u32,
    mean: f32,
    m2: f32,
}

impl RunningRms {
    pub fn push(&mut self, x: f32) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f32;
        self.m2 += delta * (x - self.mean);
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    /// AC RMS with the mean removed; 0 for an empty window.
    pub fn rms(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        libm::sqrtf(self.m2 / self.count as f32)
    }
}

/// Per-phase AC RMS in millivolts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseRms {
    pub a_mv: f32,
    pub b_mv: f32,
    pub c_mv: f32,
}

pub struct ThreePhaseCurrent<A, D> {
    phases: [A; 3],
    delay: D,
    config: CurrentSenseConfig,
    /// mV -> A; the bias stays zero since the window already removes DC.
    calibration: AffineCalibration,
}

impl<A: AnalogInput, D: DelayNs> ThreePhaseCurrent<A, D> {
    pub fn new(phases: [A; 3], delay: D, config: CurrentSenseConfig) -> Self {
        Self {
            phases,
            delay,
            config,
            calibration: AffineCalibration::scaled(config.volts_per_amp * 1000.0),
        }
    }

    pub fn release(self) -> ([A; 3], D) {
        (self.phases, self.delay)
    }

    fn sensitivity_usable(&self) -> bool {
        self.config.volts_per_amp.is_finite() && self.config.volts_per_amp > 0.0
    }
}

impl<A: AnalogInput, D: DelayNs> SensorDriver for ThreePhaseCurrent<A, D> {
    type Raw = PhaseRms;
    type Reading = CurrentPacket;
    type Error = A::Error;

    async fn initialize(&mut self) -> Result<(), SensorError<A::Error>> {
        if !self.sensitivity_usable() {
            error!("current front end: volts-per-amp must be positive");
            return Err(SensorError::InvalidConfig);
        }
        let adc = self.config.adc;
        for phase in self.phases.iter_mut() {
            phase.configure(&adc).map_err(SensorError::Bus)?;
        }
        info!(
            "current front end ready: {}-bit, {} samples @ {}us",
            adc.width_bits,
            self.config.window_samples,
            self.config.sample_delay_us
        );
        Ok(())
    }

    /// The three phases are sampled interleaved so their windows overlap in time.
    async fn read_raw(&mut self) -> Result<PhaseRms, SensorError<A::Error>> {
        let mut windows = [RunningRms::default(); 3];

        for _ in 0..self.config.window_samples {
            for (phase, window) in self.phases.iter_mut().zip(windows.iter_mut()) {
                let mv = phase.read_millivolts().map_err(SensorError::Bus)?;
                window.push(mv as f32);
            }
            if self.config.sample_delay_us > 0 {
                self.delay.delay_us(self.config.sample_delay_us).await;
            }
        }

        Ok(PhaseRms {
            a_mv: windows[0].rms(),
            b_mv: windows[1].rms(),
            c_mv: windows[2].rms(),
        })
    }

    async fn read_calibrated(&mut self) -> Result<CurrentPacket, SensorError<A::Error>> {
        let rms = self.read_raw().await?;
        if !self.sensitivity_usable() {
            return Ok(CurrentPacket::default());
        }
        Ok(CurrentPacket::new(
            self.calibration.apply(rms.a_mv),
            self.calibration.apply(rms.b_mv),
            self.calibration.apply(rms.c_mv),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_has_no_ac_component() {
        let mut w = RunningRms::default();
        for _ in 0..64 {
            w.push(1650.0);
        }
        assert_eq!(w.mean(), 1650.0);
        assert_eq!(w.rms(), 0.0);
    }

    #[test]
    fn square_wave_rms_is_its_amplitude() {
        let mut w = RunningRms::default();
        for i in 0..100 {
            w.push(if i % 2 == 0 { 1700.0 } else { 1500.0 });
        }
        assert!((w.mean() - 1600.0).abs() < 1e-3);
        assert!((w.rms() - 100.0).abs() < 1e-2);
    }

    #[test]
    fn empty_window_is_zero() {
        assert_eq!(RunningRms::default().rms(), 0.0);
    }
}
