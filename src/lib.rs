#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module below.
mod fmt;

pub mod calibration;
pub mod config;
pub mod drivers;
pub mod filter;
pub mod ipc;
pub mod links;
pub mod packet;
pub mod tasks;

pub use calibration::{AffineCalibration, CalibrationReport};
pub use drivers::{Calibrate, SensorDriver, SensorError, Vector3};
pub use filter::EmaFilter;
pub use links::LinkError;
pub use packet::{CurrentPacket, FusedTelemetryPacket, CURRENT_PACKET_LEN, FUSED_PACKET_LEN};
pub use tasks::{CurrentNode, FusionNode, SystemAlert};
