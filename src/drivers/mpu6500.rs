//! MPU6500 accelerometer over I2C, ±2 g range.
//!
//! Affine model per axis: `a = (raw - bias) / 16384`, with biases estimated
//! in raw counts while the board rests with Z pointing up.

use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use super::{Calibrate, SensorDriver, SensorError, Vector3};
use crate::calibration::{AffineCalibration, CalibrationAccumulator, CalibrationReport};
use crate::config::{ImuConfig, ACCEL_LSB_PER_G};
use crate::filter::{self, EmaFilter};

// MPU6500 Register Addresses
const PWR_MGMT_1: u8 = 0x6B;
const ACCEL_CONFIG: u8 = 0x1C;
const ACCEL_CONFIG_2: u8 = 0x1D;
const ACCEL_XOUT_H: u8 = 0x3B;

const PWR_WAKE: u8 = 0x00; // clear SLEEP, internal oscillator
const ACCEL_FS_2G: u8 = 0x00;
const ACCEL_DLPF_44HZ: u8 = 0x03;

/// Raw accelerometer counts as they come off the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawAccel {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawAccel {
    /// Register order is XH XL YH YL ZH ZL.
    pub fn from_be_bytes(buf: [u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([buf[0], buf[1]]),
            y: i16::from_be_bytes([buf[2], buf[3]]),
            z: i16::from_be_bytes([buf[4], buf[5]]),
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }
}

pub struct Mpu6500<I2C, D> {
    i2c: I2C,
    delay: D,
    config: ImuConfig,
    axes: [AffineCalibration; 3],
    filters: [EmaFilter<f32>; 3],
}

impl<I2C: I2c, D: DelayNs> Mpu6500<I2C, D> {
    pub fn new(i2c: I2C, delay: D, config: ImuConfig) -> Self {
        Self {
            i2c,
            delay,
            config,
            axes: [AffineCalibration::scaled(ACCEL_LSB_PER_G); 3],
            filters: [EmaFilter::new(config.accel_alpha); 3],
        }
    }

    /// Per-axis calibration in raw counts (X, Y, Z).
    pub fn calibration(&self) -> [AffineCalibration; 3] {
        self.axes
    }

    pub fn set_calibration(&mut self, axes: [AffineCalibration; 3]) {
        self.axes = axes;
    }

    async fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError<I2C::Error>> {
        self.i2c
            .write(self.config.address, &[reg, value])
            .await
            .map_err(SensorError::Bus)
    }
}

impl<I2C: I2c, D: DelayNs> SensorDriver for Mpu6500<I2C, D> {
    type Raw = RawAccel;
    type Reading = Vector3;
    type Error = I2C::Error;

    async fn initialize(&mut self) -> Result<(), SensorError<I2C::Error>> {
        info!("MPU6500 init at 0x{:02X}", self.config.address);
        if !filter::valid_alpha(self.config.accel_alpha) {
            error!("MPU6500: filter alpha must be in (0, 1]");
            return Err(SensorError::InvalidConfig);
        }

        self.write_register(PWR_MGMT_1, PWR_WAKE).await?;
        self.write_register(ACCEL_CONFIG, ACCEL_FS_2G).await?;
        self.write_register(ACCEL_CONFIG_2, ACCEL_DLPF_44HZ).await?;

        info!("MPU6500 ready: ±2g, DLPF on");
        Ok(())
    }

    async fn read_raw(&mut self) -> Result<RawAccel, SensorError<I2C::Error>> {
        let mut buf = [0u8; 6];
        self.i2c
            .write_read(self.config.address, &[ACCEL_XOUT_H], &mut buf)
            .await
            .map_err(SensorError::Bus)?;
        Ok(RawAccel::from_be_bytes(buf))
    }

    async fn read_calibrated(&mut self) -> Result<Vector3, SensorError<I2C::Error>> {
        let raw = self.read_raw().await?.to_array();

        let mut g = [0f32; 3];
        for (i, out) in g.iter_mut().enumerate() {
            *out = self.filters[i].update(self.axes[i].apply(raw[i]));
        }

        Ok(Vector3::new(g[0], g[1], g[2]))
    }
}

impl<I2C: I2c, D: DelayNs> Calibrate for Mpu6500<I2C, D> {
    /// `reference` is what the vertical (Z) axis should read at rest, in g;
    /// defaults to +1 g. X and Y are expected to read zero.
    async fn calibrate(
        &mut self,
        samples: u32,
        reference: Option<f32>,
    ) -> Result<CalibrationReport, SensorError<I2C::Error>> {
        let vertical_g = reference.unwrap_or(1.0);
        let mut acc = CalibrationAccumulator::<3>::new();

        for _ in 0..samples {
            match self.read_raw().await {
                Ok(raw) => acc.push(raw.to_array()),
                Err(_) => acc.skip(),
            }
            self.delay.delay_ms(self.config.calibration_settle_ms).await;
        }

        let Some(mean) = acc.mean() else {
            warn!(
                "MPU6500 calibration incomplete: 0/{} reads, keeping previous bias",
                acc.attempted()
            );
            return Err(SensorError::CalibrationIncomplete {
                attempted: acc.attempted(),
            });
        };

        let expected = [0.0, 0.0, vertical_g * ACCEL_LSB_PER_G];
        for i in 0..3 {
            self.axes[i] = self.axes[i].rebias(mean[i], expected[i]);
            self.filters[i].reset();
        }

        let report = acc.report();
        info!(
            "MPU6500 calibrated from {}/{} reads, bias x={} y={} z={}",
            report.accepted,
            report.attempted,
            self.axes[0].bias,
            self.axes[1].bias,
            self.axes[2].bias
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_axes_are_big_endian() {
        let raw = RawAccel::from_be_bytes([0x40, 0x00, 0xFF, 0x38, 0x80, 0x00]);
        assert_eq!(raw.x, 16384);
        assert_eq!(raw.y, -200);
        assert_eq!(raw.z, i16::MIN);
    }
}
