//! Node-to-node relay over a connectionless datagram radio (ESP-NOW style).
//!
//! Best effort, one direction: the current node's [`PeerSender`] fires
//! [`CurrentPacket`]s at the fusion node, whose [`PeerReceiver`] keeps only
//! the most recent one. No acknowledgement, no retransmission, no queue.
//!
//! The radio stack calls back through a plain function pointer that cannot
//! carry context, so received frames are routed to the single receiver made
//! active by [`PeerReceiver::initialize`]. Initializing a second receiver
//! redirects the callback to it and the first one stops receiving.

use portable_atomic::{AtomicU32, Ordering};

use super::LinkError;
use crate::config::PeerConfig;
use crate::ipc::{self, LatestSlot};
use crate::packet::{CurrentPacket, CURRENT_PACKET_LEN};

/// 6-byte station address identifying a device on the peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress(pub [u8; 6]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerInfo {
    pub address: PeerAddress,
    pub channel: u8,
    pub encrypt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendStatus {
    Delivered,
    Failed,
}

/// Invoked by the stack for every received frame, from its own context.
pub type ReceiveCallback = fn(&PeerAddress, &[u8]);
/// Invoked by the stack when a queued frame finished transmitting.
pub type SendCallback = fn(&PeerAddress, SendStatus);

/// Platform binding for the datagram stack.
pub trait PeerRadio {
    type Error;

    /// Station mode plus datagram layer bring-up; called once per device.
    fn init_stack(&mut self) -> Result<(), Self::Error>;

    fn register_receive_callback(&mut self, callback: ReceiveCallback) -> Result<(), Self::Error>;

    fn register_send_callback(&mut self, callback: SendCallback) -> Result<(), Self::Error>;

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<(), Self::Error>;

    /// Queues one frame. `Ok` only means the stack accepted it.
    fn send(&mut self, peer: &PeerAddress, frame: &[u8]) -> Result<(), Self::Error>;
}

fn ensure_stack<R: PeerRadio>(radio: &mut R) -> Result<(), LinkError<R::Error>> {
    if ipc::peer_stack_ready() {
        return Ok(());
    }
    radio.init_stack().map_err(LinkError::Radio)?;
    ipc::mark_peer_stack_ready();
    info!("peer stack up");
    Ok(())
}

/* ------------------------------------------------------------------------- */
/*  Sender                                                                   */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenderStats {
    /// Frames the stack accepted for transmission.
    pub accepted: u32,
    /// Frames the stack refused outright.
    pub rejected: u32,
    /// Completions reported as delivered, device-wide.
    pub delivered: u32,
    /// Completions reported as failed, device-wide.
    pub failed: u32,
}

fn on_send_complete(_peer: &PeerAddress, status: SendStatus) {
    ipc::record_send_completion(status == SendStatus::Delivered);
}

pub struct PeerSender<R> {
    radio: R,
    config: PeerConfig,
    initialized: bool,
    accepted: u32,
    rejected: u32,
}

impl<R: PeerRadio> PeerSender<R> {
    pub fn new(radio: R, config: PeerConfig) -> Self {
        Self {
            radio,
            config,
            initialized: false,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Brings the stack up if needed and registers the peer, unencrypted.
    pub fn initialize(&mut self) -> Result<(), LinkError<R::Error>> {
        ensure_stack(&mut self.radio)?;
        self.radio
            .register_send_callback(on_send_complete)
            .map_err(LinkError::Radio)?;

        let peer = PeerInfo {
            address: self.config.peer,
            channel: self.config.channel,
            encrypt: false,
        };
        self.radio.add_peer(&peer).map_err(LinkError::Radio)?;

        self.initialized = true;
        info!("peer registered on channel {}", self.config.channel);
        Ok(())
    }

    /// Fire and forget; success says nothing about reception.
    pub fn send(&mut self, packet: &CurrentPacket) -> Result<(), LinkError<R::Error>> {
        if !self.initialized {
            return Err(LinkError::NotInitialized);
        }
        match self.radio.send(&self.config.peer, &packet.to_bytes()) {
            Ok(()) => {
                self.accepted = self.accepted.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                self.rejected = self.rejected.wrapping_add(1);
                Err(LinkError::Radio(e))
            }
        }
    }

    pub fn stats(&self) -> SenderStats {
        let (delivered, failed) = ipc::send_completions();
        SenderStats {
            accepted: self.accepted,
            rejected: self.rejected,
            delivered,
            failed,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

/* ------------------------------------------------------------------------- */
/*  Receiver                                                                 */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceiverStats {
    pub accepted: u32,
    /// Dropped for having the wrong length.
    pub malformed: u32,
    /// Dropped for coming from a device other than the expected sender.
    pub foreign: u32,
    /// Accepted frames that replaced one nobody had read yet.
    pub overwritten: u32,
}

pub struct PeerReceiver {
    slot: LatestSlot<CurrentPacket>,
    sender_filter: Option<PeerAddress>,
    accepted: AtomicU32,
    malformed: AtomicU32,
    foreign: AtomicU32,
    overwritten: AtomicU32,
}

impl PeerReceiver {
    /// Accepts frames from any sender.
    pub const fn new() -> Self {
        Self::build(None)
    }

    /// Drops frames whose source is not `sender`.
    pub const fn with_sender_filter(sender: PeerAddress) -> Self {
        Self::build(Some(sender))
    }

    const fn build(sender_filter: Option<PeerAddress>) -> Self {
        Self {
            slot: LatestSlot::new(CurrentPacket::new(0.0, 0.0, 0.0)),
            sender_filter,
            accepted: AtomicU32::new(0),
            malformed: AtomicU32::new(0),
            foreign: AtomicU32::new(0),
            overwritten: AtomicU32::new(0),
        }
    }

    /// Brings the stack up if needed, makes this the active receiver and
    /// points the stack's receive callback at [`on_peer_frame`].
    pub fn initialize<R: PeerRadio>(&'static self, radio: &mut R) -> Result<(), LinkError<R::Error>> {
        ensure_stack(radio)?;
        if ipc::activate_peer_receiver(self) {
            warn!("peer receiver replaced, previous instance no longer receives");
        }
        radio
            .register_receive_callback(on_peer_frame)
            .map_err(LinkError::Radio)?;
        info!("peer receiver listening");
        Ok(())
    }

    /// Receive-context entry point. Only a frame of exactly
    /// [`CURRENT_PACKET_LEN`] bytes replaces the retained packet; anything
    /// else is dropped without a trace beyond the counters.
    pub fn handle_frame(&self, source: &PeerAddress, data: &[u8]) -> bool {
        if let Some(expected) = self.sender_filter {
            if *source != expected {
                self.foreign.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let Some(packet) = CurrentPacket::from_bytes(data) else {
            self.malformed.fetch_add(1, Ordering::Relaxed);
            debug!("peer frame dropped: {} bytes, want {}", data.len(), CURRENT_PACKET_LEN);
            return false;
        };

        if self.slot.publish(packet) {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn has_new_packet(&self) -> bool {
        self.slot.has_new()
    }

    /// Copy of the retained packet; clears the new-data flag in the same
    /// critical section.
    pub fn latest(&self) -> CurrentPacket {
        self.slot.latest()
    }

    /// `Some` only if a packet arrived since the last read.
    pub fn take(&self) -> Option<CurrentPacket> {
        self.slot.take()
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            foreign: self.foreign.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
        }
    }
}

impl Default for PeerReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-signature receive callback handed to the stack. Forwards to the
/// active receiver, or drops the frame if none is active.
pub fn on_peer_frame(source: &PeerAddress, data: &[u8]) {
    if let Some(receiver) = ipc::active_peer_receiver() {
        receiver.handle_frame(source, data);
    }
}
