//! SHT30 temperature over I2C, single-shot measurements.
//!
//! Calibration is an additive offset against a known ambient temperature:
//! `T_cal = T_uncal - (mean(T_uncal) - T_ambient)`.

use crc::{Crc, CRC_8_NRSC_5};
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use super::{Calibrate, SensorDriver, SensorError};
use crate::calibration::{AffineCalibration, CalibrationAccumulator, CalibrationReport};
use crate::config::TemperatureConfig;
use crate::filter::{self, EmaFilter};

const CMD_SOFT_RESET: [u8; 2] = [0x30, 0xA2];
/// High repeatability, clock stretching enabled.
const CMD_MEASURE_SINGLE_SHOT: [u8; 2] = [0x2C, 0x06];
const SOFT_RESET_MS: u32 = 2;

/// Sensirion's CRC-8 (poly 0x31, init 0xFF, unreflected) is catalogued as NRSC-5.
const SENSIRION_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

/// Checksum over one data word.
pub fn crc8(data: &[u8]) -> u8 {
    SENSIRION_CRC.checksum(data)
}

pub fn raw_to_celsius(raw: u16) -> f32 {
    -45.0 + 175.0 * (raw as f32 / 65535.0)
}

pub struct Sht30<I2C, D> {
    i2c: I2C,
    delay: D,
    config: TemperatureConfig,
    calibration: AffineCalibration,
    filter: EmaFilter<f32>,
}

impl<I2C: I2c, D: DelayNs> Sht30<I2C, D> {
    pub fn new(i2c: I2C, delay: D, config: TemperatureConfig) -> Self {
        Self {
            i2c,
            delay,
            config,
            calibration: AffineCalibration::IDENTITY,
            filter: EmaFilter::new(config.alpha),
        }
    }

    /// Current offset model in °C.
    pub fn calibration(&self) -> AffineCalibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: AffineCalibration) {
        self.calibration = calibration;
    }

    async fn read_uncalibrated(&mut self) -> Result<f32, SensorError<I2C::Error>> {
        Ok(raw_to_celsius(self.read_raw().await?))
    }
}

impl<I2C: I2c, D: DelayNs> SensorDriver for Sht30<I2C, D> {
    type Raw = u16;
    type Reading = f32;
    type Error = I2C::Error;

    async fn initialize(&mut self) -> Result<(), SensorError<I2C::Error>> {
        info!("SHT30 init at 0x{:02X}", self.config.address);
        if !filter::valid_alpha(self.config.alpha) {
            error!("SHT30 0x{:02X}: filter alpha must be in (0, 1]", self.config.address);
            return Err(SensorError::InvalidConfig);
        }
        self.i2c
            .write(self.config.address, &CMD_SOFT_RESET)
            .await
            .map_err(SensorError::Bus)?;
        self.delay.delay_ms(SOFT_RESET_MS).await;
        Ok(())
    }

    /// Reply layout: T msb, T lsb, T crc, RH msb, RH lsb, RH crc.
    async fn read_raw(&mut self) -> Result<u16, SensorError<I2C::Error>> {
        let addr = self.config.address;
        self.i2c
            .write(addr, &CMD_MEASURE_SINGLE_SHOT)
            .await
            .map_err(SensorError::Bus)?;

        self.delay.delay_ms(self.config.conversion_wait_ms).await;

        let mut buf = [0u8; 6];
        self.i2c.read(addr, &mut buf).await.map_err(SensorError::Bus)?;

        if crc8(&buf[0..2]) != buf[2] {
            debug!("SHT30 0x{:02X}: temperature CRC mismatch", addr);
            return Err(SensorError::Crc);
        }
        Ok(u16::from_be_bytes([buf[0], buf[1]]))
    }

    async fn read_calibrated(&mut self) -> Result<f32, SensorError<I2C::Error>> {
        let t = self.read_uncalibrated().await?;
        Ok(self.filter.update(self.calibration.apply(t)))
    }
}

impl<I2C: I2c, D: DelayNs> Calibrate for Sht30<I2C, D> {
    /// `reference` is the known room temperature in °C and is required.
    async fn calibrate(
        &mut self,
        samples: u32,
        reference: Option<f32>,
    ) -> Result<CalibrationReport, SensorError<I2C::Error>> {
        let Some(ambient_c) = reference else {
            return Err(SensorError::InvalidConfig);
        };

        let mut acc = CalibrationAccumulator::<1>::new();
        for _ in 0..samples {
            match self.read_uncalibrated().await {
                Ok(t) => acc.push([t]),
                Err(_) => acc.skip(),
            }
            self.delay.delay_ms(self.config.calibration_settle_ms).await;
        }

        let Some([mean]) = acc.mean() else {
            warn!(
                "SHT30 0x{:02X} calibration incomplete after {} reads, keeping offset",
                self.config.address,
                acc.attempted()
            );
            return Err(SensorError::CalibrationIncomplete {
                attempted: acc.attempted(),
            });
        };

        self.calibration = self.calibration.rebias(mean, ambient_c);
        self.filter.reset();

        let report = acc.report();
        info!(
            "SHT30 0x{:02X} offset {} C from {}/{} reads",
            self.config.address,
            -self.calibration.bias,
            report.accepted,
            report.attempted
        );
        Ok(report)
    }
}
