//! Sampling loop for the current-sensing node.

use embassy_time::{Duration, Ticker};

use super::BringUp;
use crate::drivers::SensorDriver;
use crate::links::{PeerRadio, PeerSender};
use crate::packet::CurrentPacket;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentStats {
    pub windows: u32,
    pub read_failures: u32,
    pub sent: u32,
    pub send_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentReport {
    /// `None` if the sampling window failed.
    pub packet: Option<CurrentPacket>,
    /// The stack accepted the frame (not proof of reception).
    pub sent: bool,
}

pub struct CurrentNode<S, R> {
    sensor: S,
    sender: PeerSender<R>,
    period_ms: u64,
    stats: CurrentStats,
}

impl<S, R> CurrentNode<S, R>
where
    S: SensorDriver<Reading = CurrentPacket>,
    R: PeerRadio,
{
    pub fn new(sensor: S, sender: PeerSender<R>, period_ms: u64) -> Self {
        Self {
            sensor,
            sender,
            period_ms,
            stats: CurrentStats::default(),
        }
    }

    /// Returns the front end's status and whether the peer link came up.
    pub async fn bring_up(&mut self) -> (BringUp, bool) {
        let sensor = match self.sensor.initialize().await {
            Ok(()) => BringUp::Ready,
            Err(e) => {
                error!("current front end init failed: {}", e.describe());
                BringUp::Failed
            }
        };
        let link = match self.sender.initialize() {
            Ok(()) => true,
            Err(e) => {
                error!("peer sender init failed: {}", e.describe());
                false
            }
        };
        (sensor, link)
    }

    /// Samples one window and sends it. Neither failure stops the node.
    pub async fn step(&mut self) -> CurrentReport {
        let packet = match self.sensor.read_calibrated().await {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.read_failures = self.stats.read_failures.wrapping_add(1);
                if self.stats.read_failures % 100 == 1 {
                    warn!("current window #{} failed: {}", self.stats.read_failures, e.describe());
                }
                return CurrentReport {
                    packet: None,
                    sent: false,
                };
            }
        };
        self.stats.windows = self.stats.windows.wrapping_add(1);

        trace!("ia={} ib={} ic={} A", packet.ia, packet.ib, packet.ic);

        let sent = match self.sender.send(&packet) {
            Ok(()) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                true
            }
            Err(e) => {
                self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
                if self.stats.send_failures % 100 == 1 {
                    warn!("peer send #{} refused: {}", self.stats.send_failures, e.describe());
                }
                false
            }
        };

        CurrentReport {
            packet: Some(packet),
            sent,
        }
    }

    pub async fn run(&mut self) -> ! {
        info!("current node started - {}ms period", self.period_ms);
        let mut ticker = Ticker::every(Duration::from_millis(self.period_ms));
        loop {
            self.step().await;
            ticker.next().await;
        }
    }

    pub fn stats(&self) -> CurrentStats {
        self.stats
    }

    pub fn sender(&self) -> &PeerSender<R> {
        &self.sender
    }
}
