//! Fixed-layout wire packets.
//!
//! Both packets are dense runs of little-endian IEEE-754 `f32`s with no
//! header, padding or length prefix.

use bytemuck::{Pod, Zeroable};

use crate::drivers::Vector3;

pub const CURRENT_PACKET_LEN: usize = 12;
pub const FUSED_PACKET_LEN: usize = 28;

/// Three-phase RMS currents in amps, current node -> fusion node.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Zeroable, Pod)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentPacket {
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
}

/// One fusion-loop sample, fusion node -> host.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Zeroable, Pod)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusedTelemetryPacket {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub temp: f32,
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
}

const _: () = assert!(core::mem::size_of::<CurrentPacket>() == CURRENT_PACKET_LEN);
const _: () = assert!(core::mem::size_of::<FusedTelemetryPacket>() == FUSED_PACKET_LEN);

fn encode_words<const B: usize>(words: &[f32]) -> [u8; B] {
    let mut out = [0u8; B];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn decode_words<const W: usize>(bytes: &[u8]) -> [f32; W] {
    let mut words = [0f32; W];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

impl CurrentPacket {
    pub const fn new(ia: f32, ib: f32, ic: f32) -> Self {
        Self { ia, ib, ic }
    }

    pub fn to_bytes(&self) -> [u8; CURRENT_PACKET_LEN] {
        let words: [f32; 3] = bytemuck::cast(*self);
        encode_words(&words)
    }

    /// Rejects anything that is not exactly [`CURRENT_PACKET_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CURRENT_PACKET_LEN {
            return None;
        }
        Some(bytemuck::cast(decode_words::<3>(bytes)))
    }
}

impl FusedTelemetryPacket {
    pub fn assemble(accel: Vector3, temp: f32, current: CurrentPacket) -> Self {
        Self {
            ax: accel.x,
            ay: accel.y,
            az: accel.z,
            temp,
            ia: current.ia,
            ib: current.ib,
            ic: current.ic,
        }
    }

    pub fn accel(&self) -> Vector3 {
        Vector3 {
            x: self.ax,
            y: self.ay,
            z: self.az,
        }
    }

    pub fn current(&self) -> CurrentPacket {
        CurrentPacket::new(self.ia, self.ib, self.ic)
    }

    pub fn to_bytes(&self) -> [u8; FUSED_PACKET_LEN] {
        let words: [f32; 7] = bytemuck::cast(*self);
        encode_words(&words)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FUSED_PACKET_LEN {
            return None;
        }
        Some(bytemuck::cast(decode_words::<7>(bytes)))
    }
}
