// Centralize all configuration constants
use heapless::String;

use crate::drivers::current::{AdcAttenuation, AdcConfig};
use crate::links::host::Uuid128;
use crate::links::peer::PeerAddress;

pub const FUSION_PERIOD_MS: u64 = 20;
pub const CURRENT_PERIOD_MS: u64 = 50;
pub const STATS_INTERVAL_MS: u64 = 5_000;

// Consecutive failed fusion iterations before an alert is raised
pub const LOCAL_FAILURE_ALERT_THRESHOLD: u32 = 50;

/* ───── MPU6500 ─────────────────────────────────────────────────────── */
pub const MPU6500_ADDRESS_A: u8 = 0x68; // AD0 low
pub const MPU6500_ADDRESS_B: u8 = 0x69; // AD0 high
/// LSB per g in the ±2 g range.
pub const ACCEL_LSB_PER_G: f32 = 16384.0;
pub const ACCEL_ALPHA: f32 = 0.2;
pub const IMU_CALIBRATION_SAMPLES: u32 = 500;
pub const IMU_CALIBRATION_SETTLE_MS: u32 = 2;

/* ───── SHT30 ───────────────────────────────────────────────────────── */
pub const SHT30_ADDRESS_A: u8 = 0x44; // ADDR low
pub const SHT30_ADDRESS_B: u8 = 0x45; // ADDR high
pub const TEMP_ALPHA: f32 = 0.05;
pub const SHT30_CONVERSION_MS: u32 = 15;
pub const TEMP_CALIBRATION_SAMPLES: u32 = 50;
pub const TEMP_CALIBRATION_SETTLE_MS: u32 = 20;

/* ───── Current front end ───────────────────────────────────────────── */
pub const ADC_WIDTH_BITS: u8 = 12;
pub const RMS_WINDOW_SAMPLES: u16 = 256;
pub const RMS_SAMPLE_DELAY_US: u32 = 500;
/// Burden-resistor output of the CT clamps.
pub const CT_VOLTS_PER_AMP: f32 = 0.1;

/* ───── Radio identities ────────────────────────────────────────────── */
pub const HOST_DEVICE_NAME: &str = "ESP32";
pub const TELEMETRY_SERVICE_UUID: Uuid128 = Uuid128::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);
pub const TELEMETRY_CHAR_UUID: Uuid128 = Uuid128::from_u128(0x488147e4_8512_4bca_b218_0b84f2f76853);
/// Station address of the vibration/temperature node.
pub const FUSION_NODE_ADDRESS: PeerAddress = PeerAddress([0x24, 0x6f, 0x28, 0x9d, 0x41, 0x10]);
/// Station address of the current-sensing node.
pub const CURRENT_NODE_ADDRESS: PeerAddress = PeerAddress([0x24, 0x6f, 0x28, 0x9d, 0x52, 0x8c]);

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuConfig {
    pub address: u8,
    pub accel_alpha: f32,
    pub calibration_settle_ms: u32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            address: MPU6500_ADDRESS_A,
            accel_alpha: ACCEL_ALPHA,
            calibration_settle_ms: IMU_CALIBRATION_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TemperatureConfig {
    pub address: u8,
    pub alpha: f32,
    pub conversion_wait_ms: u32,
    pub calibration_settle_ms: u32,
}

impl TemperatureConfig {
    pub fn at(address: u8) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            address: SHT30_ADDRESS_A,
            alpha: TEMP_ALPHA,
            conversion_wait_ms: SHT30_CONVERSION_MS,
            calibration_settle_ms: TEMP_CALIBRATION_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSenseConfig {
    pub adc: AdcConfig,
    pub volts_per_amp: f32,
    pub window_samples: u16,
    pub sample_delay_us: u32,
}

impl Default for CurrentSenseConfig {
    fn default() -> Self {
        Self {
            adc: AdcConfig {
                width_bits: ADC_WIDTH_BITS,
                attenuation: AdcAttenuation::Db11,
            },
            volts_per_amp: CT_VOLTS_PER_AMP,
            window_samples: RMS_WINDOW_SAMPLES,
            sample_delay_us: RMS_SAMPLE_DELAY_US,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerConfig {
    /// Device the sender transmits to.
    pub peer: PeerAddress,
    /// Radio channel, 0 follows whatever channel the station is on.
    pub channel: u8,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            peer: FUSION_NODE_ADDRESS,
            channel: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostLinkConfig {
    pub device_name: String<29>,
    pub service: Uuid128,
    pub characteristic: Uuid128,
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        let mut device_name = String::new();
        // Fits: the advertised name is far below the 29-byte limit.
        let _ = device_name.push_str(HOST_DEVICE_NAME);
        Self {
            device_name,
            service: TELEMETRY_SERVICE_UUID,
            characteristic: TELEMETRY_CHAR_UUID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusionConfig {
    pub period_ms: u64,
    pub stats_interval_ms: u64,
    pub failure_alert_threshold: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            period_ms: FUSION_PERIOD_MS,
            stats_interval_ms: STATS_INTERVAL_MS,
            failure_alert_threshold: LOCAL_FAILURE_ALERT_THRESHOLD,
        }
    }
}

/// Stationary bring-up plan for the fusion node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationPlan {
    pub imu_samples: u32,
    pub temp_samples: u32,
    /// Known ambient temperature the operator measured, °C.
    pub ambient_c: f32,
}

impl CalibrationPlan {
    pub fn with_ambient(ambient_c: f32) -> Self {
        Self {
            imu_samples: IMU_CALIBRATION_SAMPLES,
            temp_samples: TEMP_CALIBRATION_SAMPLES,
            ambient_c,
        }
    }
}
