pub mod host;
pub mod peer;

pub use host::{ConnectionTracker, GattPeripheral, HostUplink, LinkState, PublishOutcome, Uuid128};
pub use peer::{on_peer_frame, PeerAddress, PeerRadio, PeerReceiver, PeerSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// The radio stack refused the request.
    Radio(E),
    /// `initialize` has not completed on this endpoint.
    NotInitialized,
}

impl<E> LinkError<E> {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Radio(_) => "radio stack error",
            Self::NotInitialized => "link not initialized",
        }
    }
}

impl<E> From<E> for LinkError<E> {
    fn from(e: E) -> Self {
        Self::Radio(e)
    }
}
