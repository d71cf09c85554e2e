//! Node-to-host uplink over a notify-only GATT service (BLE peripheral).
//!
//! ```text
//!  Idle ──initialize──▶ Advertising ──connect──▶ Connected
//!                           ▲                        │
//!                           └──────disconnect────────┘
//! ```
//!
//! Connect/disconnect events arrive from the stack's own context and only
//! touch the single-word state in [`ConnectionTracker`]. The GATT handle is
//! owned by whoever publishes, so the advertising restart requested by a
//! disconnect is carried out on the owner's next [`HostUplink::poll`] or
//! [`HostUplink::publish`].

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use super::LinkError;
use crate::config::HostLinkConfig;
use crate::packet::FusedTelemetryPacket;

/// 128-bit GATT identifier, stored in the order it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid128(pub [u8; 16]);

impl Uuid128 {
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Byte order used on air.
    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.as_u128().to_le_bytes()
    }
}

impl fmt::Display for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicProperties {
    pub read: bool,
    pub notify: bool,
}

/// One service holding the single telemetry characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceDefinition {
    pub service: Uuid128,
    pub characteristic: Uuid128,
    pub properties: CharacteristicProperties,
    /// Add the client characteristic configuration descriptor (0x2902).
    pub client_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Advertisement {
    pub service: Uuid128,
    pub scan_response: bool,
    /// Preferred connection interval hint, 0 leaves it to the central.
    pub min_preferred: u16,
}

/// Platform binding for the peripheral stack.
pub trait GattPeripheral {
    type Error;

    fn init(&mut self, device_name: &str) -> Result<(), Self::Error>;

    fn add_service(&mut self, service: &ServiceDefinition) -> Result<(), Self::Error>;

    fn start_advertising(&mut self, advertisement: &Advertisement) -> Result<(), Self::Error>;

    fn set_value(&mut self, characteristic: &Uuid128, value: &[u8]) -> Result<(), Self::Error>;

    /// Pushes the current value to the subscribed client; no acknowledgement.
    fn notify(&mut self, characteristic: &Uuid128) -> Result<(), Self::Error>;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle = 0,
    Advertising = 1,
    Connected = 2,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Advertising,
            2 => Self::Connected,
            _ => Self::Idle,
        }
    }
}

/// Connection state written by the stack's callbacks and read by the loop.
pub struct ConnectionTracker {
    state: AtomicU8,
    restart_pending: AtomicBool,
    connections: AtomicU32,
    disconnections: AtomicU32,
}

impl ConnectionTracker {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Idle as u8),
            restart_pending: AtomicBool::new(false),
            connections: AtomicU32::new(0),
            disconnections: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Stack callback: a central connected. Only valid while advertising.
    pub fn on_connect(&self) {
        match self.transition(LinkState::Advertising, LinkState::Connected) {
            Ok(()) => {
                self.restart_pending.store(false, Ordering::Release);
                self.connections.fetch_add(1, Ordering::Relaxed);
                info!("host connected");
            }
            Err(LinkState::Idle) => warn!("connect event before advertising, ignored"),
            Err(_) => {}
        }
    }

    /// Stack callback: the central went away. Advertising is requested again.
    pub fn on_disconnect(&self) {
        if self
            .transition(LinkState::Connected, LinkState::Advertising)
            .is_ok()
        {
            self.restart_pending.store(true, Ordering::Release);
            self.disconnections.fetch_add(1, Ordering::Relaxed);
            info!("host disconnected, restarting advertising");
        }
    }

    /// `(connections, disconnections)` since boot.
    pub fn counts(&self) -> (u32, u32) {
        (
            self.connections.load(Ordering::Relaxed),
            self.disconnections.load(Ordering::Relaxed),
        )
    }

    fn transition(&self, from: LinkState, to: LinkState) -> Result<(), LinkState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LinkState::from_u8)
    }

    fn advertising_started(&self) {
        let _ = self.transition(LinkState::Idle, LinkState::Advertising);
    }

    fn take_restart(&self) -> bool {
        self.restart_pending.swap(false, Ordering::AcqRel)
    }

    fn request_restart(&self) {
        self.restart_pending.store(true, Ordering::Release);
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    /// Value updated and a notification queued.
    Sent,
    /// Nobody connected, nothing was done.
    NotConnected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UplinkStats {
    pub sent: u32,
    pub skipped: u32,
    pub connections: u32,
    pub disconnections: u32,
}

pub struct HostUplink<G> {
    gatt: G,
    config: HostLinkConfig,
    tracker: &'static ConnectionTracker,
    /// Bring-up steps that already succeeded, so a retry resumes after them.
    stack_up: bool,
    service_added: bool,
    sent: u32,
    skipped: u32,
}

impl<G: GattPeripheral> HostUplink<G> {
    pub fn new(gatt: G, config: HostLinkConfig, tracker: &'static ConnectionTracker) -> Self {
        Self {
            gatt,
            config,
            tracker,
            stack_up: false,
            service_added: false,
            sent: 0,
            skipped: 0,
        }
    }

    /// Creates the service and starts advertising. A second call once the
    /// link is up does nothing; a call after a failure picks up at the step
    /// that failed.
    pub fn initialize(&mut self) -> Result<(), LinkError<G::Error>> {
        if self.tracker.state() != LinkState::Idle {
            return Ok(());
        }

        if !self.stack_up {
            self.gatt
                .init(self.config.device_name.as_str())
                .map_err(LinkError::Radio)?;
            self.stack_up = true;
        }
        if !self.service_added {
            self.gatt
                .add_service(&ServiceDefinition {
                    service: self.config.service,
                    characteristic: self.config.characteristic,
                    properties: CharacteristicProperties {
                        read: true,
                        notify: true,
                    },
                    client_config: true,
                })
                .map_err(LinkError::Radio)?;
            self.service_added = true;
        }
        self.gatt
            .start_advertising(&self.advertisement())
            .map_err(LinkError::Radio)?;

        self.tracker.advertising_started();
        info!("advertising as {}, waiting for host", self.config.device_name.as_str());
        Ok(())
    }

    /// Carries out an advertising restart requested by a disconnect.
    pub fn poll(&mut self) -> Result<(), LinkError<G::Error>> {
        if !self.tracker.take_restart() {
            return Ok(());
        }
        if let Err(e) = self.gatt.start_advertising(&self.advertisement()) {
            self.tracker.request_restart();
            return Err(LinkError::Radio(e));
        }
        debug!("advertising restarted");
        Ok(())
    }

    /// Notifies the connected host with the 28-byte packet. Without a
    /// connection this is a no-op reported as [`PublishOutcome::NotConnected`].
    pub fn publish(&mut self, packet: &FusedTelemetryPacket) -> Result<PublishOutcome, LinkError<G::Error>> {
        self.poll()?;

        if !self.tracker.is_connected() {
            self.skipped = self.skipped.wrapping_add(1);
            return Ok(PublishOutcome::NotConnected);
        }

        let characteristic = self.config.characteristic;
        self.gatt
            .set_value(&characteristic, &packet.to_bytes())
            .map_err(LinkError::Radio)?;
        self.gatt.notify(&characteristic).map_err(LinkError::Radio)?;

        self.sent = self.sent.wrapping_add(1);
        Ok(PublishOutcome::Sent)
    }

    pub fn state(&self) -> LinkState {
        self.tracker.state()
    }

    pub fn is_connected(&self) -> bool {
        self.tracker.is_connected()
    }

    pub fn stats(&self) -> UplinkStats {
        let (connections, disconnections) = self.tracker.counts();
        UplinkStats {
            sent: self.sent,
            skipped: self.skipped,
            connections,
            disconnections,
        }
    }

    pub fn gatt(&self) -> &G {
        &self.gatt
    }

    fn advertisement(&self) -> Advertisement {
        Advertisement {
            service: self.config.service,
            scan_response: false,
            min_preferred: 0,
        }
    }
}
