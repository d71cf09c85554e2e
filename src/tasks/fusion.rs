//! Fusion loop for the vibration/temperature node.
//!
//! Once per period: accelerometer, both temperature sensors (averaged), the
//! newest peer current packet if one arrived, assemble, publish, sleep.
//! Nothing here waits on the radios. A missing peer packet or a failed local
//! read leaves the previous value in the packet rather than zeroing it.

use embassy_time::{Duration, Instant, Ticker};

use super::{BringUp, SystemAlert};
use crate::config::{CalibrationPlan, FusionConfig};
use crate::drivers::{Calibrate, SensorDriver, Vector3};
use crate::links::{GattPeripheral, HostUplink, PeerRadio, PeerReceiver, PublishOutcome};
use crate::packet::{CurrentPacket, FusedTelemetryPacket};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusionStats {
    pub iterations: u32,
    pub sent: u32,
    pub skipped: u32,
    pub publish_errors: u32,
    pub peer_packets: u32,
    pub imu_failures: u32,
    pub temp_failures: u32,
}

/// What one iteration produced.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusionReport {
    pub packet: FusedTelemetryPacket,
    /// `None` when the uplink reported an error.
    pub outcome: Option<PublishOutcome>,
    /// The current fields came from a packet that arrived this iteration.
    pub fresh_current: bool,
    pub alert: Option<SystemAlert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusionBringUp {
    pub imu: BringUp,
    pub temps: [BringUp; 2],
    pub peer_link: bool,
    pub uplink: bool,
}

pub struct FusionNode<M, T, G> {
    imu: M,
    temps: [T; 2],
    receiver: &'static PeerReceiver,
    uplink: HostUplink<G>,
    config: FusionConfig,

    accel: Vector3,
    temp: f32,
    current: CurrentPacket,

    stats: FusionStats,
    consecutive_local_failures: u32,
    consecutive_publish_errors: u32,
}

impl<M, T, G> FusionNode<M, T, G>
where
    M: SensorDriver<Reading = Vector3>,
    T: SensorDriver<Reading = f32>,
    G: GattPeripheral,
{
    pub fn new(
        imu: M,
        temps: [T; 2],
        receiver: &'static PeerReceiver,
        uplink: HostUplink<G>,
        config: FusionConfig,
    ) -> Self {
        Self {
            imu,
            temps,
            receiver,
            uplink,
            config,
            accel: Vector3::default(),
            temp: 0.0,
            current: CurrentPacket::default(),
            stats: FusionStats::default(),
            consecutive_local_failures: 0,
            consecutive_publish_errors: 0,
        }
    }

    /// Initializes and calibrates the local sensors (board at rest, Z up,
    /// at `plan.ambient_c`), then brings both radio links up. Failures are
    /// reported, never fatal: the loop runs with whatever came up.
    pub async fn bring_up<P: PeerRadio>(&mut self, peer_radio: &mut P, plan: &CalibrationPlan) -> FusionBringUp
    where
        M: Calibrate,
        T: Calibrate,
    {
        info!("fusion node bring-up, ambient {} C", plan.ambient_c);

        let imu = super::bring_up_sensor(&mut self.imu, "imu", plan.imu_samples, None).await;
        let mut temps = [BringUp::Failed; 2];
        for (sensor, status) in self.temps.iter_mut().zip(temps.iter_mut()) {
            *status = super::bring_up_sensor(sensor, "temperature", plan.temp_samples, Some(plan.ambient_c)).await;
        }

        let peer_link = match self.receiver.initialize(peer_radio) {
            Ok(()) => true,
            Err(e) => {
                error!("peer link init failed: {}", e.describe());
                false
            }
        };
        let uplink = match self.uplink.initialize() {
            Ok(()) => true,
            Err(e) => {
                error!("host uplink init failed: {}", e.describe());
                false
            }
        };

        FusionBringUp {
            imu,
            temps,
            peer_link,
            uplink,
        }
    }

    /// One loop iteration without the trailing sleep.
    pub async fn step(&mut self) -> FusionReport {
        self.stats.iterations = self.stats.iterations.wrapping_add(1);
        let mut local_failure = false;

        match self.imu.read_calibrated().await {
            Ok(accel) => self.accel = accel,
            Err(_) => {
                self.stats.imu_failures = self.stats.imu_failures.wrapping_add(1);
                local_failure = true;
            }
        }

        let mut sum = 0.0;
        let mut count = 0u8;
        for sensor in self.temps.iter_mut() {
            match sensor.read_calibrated().await {
                Ok(t) => {
                    sum += t;
                    count += 1;
                }
                Err(_) => self.stats.temp_failures = self.stats.temp_failures.wrapping_add(1),
            }
        }
        match count {
            0 => local_failure = true,
            n => self.temp = sum / n as f32,
        }

        let fresh_current = match self.receiver.take() {
            Some(packet) => {
                self.current = packet;
                self.stats.peer_packets = self.stats.peer_packets.wrapping_add(1);
                true
            }
            None => false,
        };

        let packet = FusedTelemetryPacket::assemble(self.accel, self.temp, self.current);

        let outcome = match self.uplink.publish(&packet) {
            Ok(outcome) => {
                match outcome {
                    PublishOutcome::Sent => self.stats.sent = self.stats.sent.wrapping_add(1),
                    PublishOutcome::NotConnected => self.stats.skipped = self.stats.skipped.wrapping_add(1),
                }
                self.consecutive_publish_errors = 0;
                Some(outcome)
            }
            Err(e) => {
                self.stats.publish_errors = self.stats.publish_errors.wrapping_add(1);
                self.consecutive_publish_errors += 1;
                if self.consecutive_publish_errors % 100 == 1 {
                    warn!("publish error #{}: {}", self.stats.publish_errors, e.describe());
                }
                None
            }
        };

        let alert = self.track_failures(local_failure);

        FusionReport {
            packet,
            outcome,
            fresh_current,
            alert,
        }
    }

    fn track_failures(&mut self, local_failure: bool) -> Option<SystemAlert> {
        let threshold = self.config.failure_alert_threshold;

        if local_failure {
            self.consecutive_local_failures += 1;
            if self.consecutive_local_failures % 100 == 1 {
                warn!(
                    "local sensor read failed, {} in a row (imu {}, temp {})",
                    self.consecutive_local_failures,
                    self.stats.imu_failures,
                    self.stats.temp_failures
                );
            }
        } else if self.consecutive_local_failures > 0 {
            info!(
                "local sensors recovered after {} failed iterations",
                self.consecutive_local_failures
            );
            self.consecutive_local_failures = 0;
        }

        if self.consecutive_local_failures >= threshold {
            if self.consecutive_local_failures == threshold {
                error!("local sensors failing for {} iterations", threshold);
            }
            Some(SystemAlert::LocalSensorFailure)
        } else if self.consecutive_publish_errors >= threshold {
            Some(SystemAlert::UplinkFailure)
        } else {
            None
        }
    }

    /// Runs forever at `config.period_ms`, logging stats every
    /// `config.stats_interval_ms`.
    pub async fn run(&mut self) -> ! {
        info!("fusion loop started - {}ms period", self.config.period_ms);
        let mut ticker = Ticker::every(Duration::from_millis(self.config.period_ms));
        let stats_every = Duration::from_millis(self.config.stats_interval_ms);
        let mut last_stats = Instant::now();

        loop {
            self.step().await;

            if last_stats.elapsed() >= stats_every {
                self.log_stats();
                last_stats = Instant::now();
            }

            ticker.next().await;
        }
    }

    fn log_stats(&self) {
        let s = self.stats;
        let rx = self.receiver.stats();
        info!(
            "fusion: {} iterations, {} sent, {} skipped, {} publish errors, {} peer packets",
            s.iterations,
            s.sent,
            s.skipped,
            s.publish_errors,
            s.peer_packets
        );
        info!(
            "peer rx: {} accepted, {} malformed, {} foreign, {} overwritten",
            rx.accepted,
            rx.malformed,
            rx.foreign,
            rx.overwritten
        );
    }

    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    pub fn uplink(&self) -> &HostUplink<G> {
        &self.uplink
    }
}
