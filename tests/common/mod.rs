//! Host-side stand-ins for the buses and radio stacks.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{self, ErrorKind, ErrorType, I2c, Operation};

use mhm_edge::drivers::current::{AdcConfig, AnalogInput};
use mhm_edge::drivers::sht30::crc8;
use mhm_edge::links::host::{Advertisement, GattPeripheral, ServiceDefinition};
use mhm_edge::links::peer::{PeerInfo, ReceiveCallback, SendCallback, SendStatus};
use mhm_edge::links::{on_peer_frame, PeerAddress, PeerRadio, Uuid128};

static REGISTRY: Mutex<()> = Mutex::new(());

/// The active-receiver registry is process-wide; tests that touch it hold this.
pub fn registry_lock() -> MutexGuard<'static, ()> {
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/* ------------------------------------------------------------------------- */
/*  I2C                                                                      */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

impl i2c::Error for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Default)]
struct BusState {
    queued: VecDeque<Vec<u8>>,
    steady: Vec<u8>,
    failing: bool,
    fail_next: u32,
    writes: Vec<(u8, Vec<u8>)>,
}

/// Scripted I2C device. Reads are served from the queue first, then from the
/// steady response. Clones share the same state.
#[derive(Clone, Default)]
pub struct FakeI2c {
    state: Rc<RefCell<BusState>>,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, bytes: &[u8]) {
        self.state.borrow_mut().steady = bytes.to_vec();
    }

    pub fn queue(&self, bytes: &[u8]) {
        self.state.borrow_mut().queued.push_back(bytes.to_vec());
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    /// Fails the next `n` transactions, then recovers.
    pub fn fail_next(&self, n: u32) {
        self.state.borrow_mut().fail_next = n;
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.borrow().writes.clone()
    }
}

impl ErrorType for FakeI2c {
    type Error = BusFault;
}

impl I2c for FakeI2c {
    async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), BusFault> {
        let mut state = self.state.borrow_mut();
        if state.failing {
            return Err(BusFault);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(BusFault);
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => state.writes.push((address, bytes.to_vec())),
                Operation::Read(buf) => {
                    let reply = match state.queued.pop_front() {
                        Some(reply) => reply,
                        None => state.steady.clone(),
                    };
                    let n = reply.len().min(buf.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                }
            }
        }
        Ok(())
    }
}

pub struct NoopDelay;

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// MPU6500 burst read of ACCEL_XOUT_H..ACCEL_ZOUT_L.
pub fn accel_frame(x: i16, y: i16, z: i16) -> [u8; 6] {
    let (x, y, z) = (x.to_be_bytes(), y.to_be_bytes(), z.to_be_bytes());
    [x[0], x[1], y[0], y[1], z[0], z[1]]
}

/// SHT30 single-shot reply with valid checksums and 50 % RH.
pub fn sht30_frame(raw_temp: u16) -> [u8; 6] {
    let t = raw_temp.to_be_bytes();
    let rh = 0x8000u16.to_be_bytes();
    [t[0], t[1], crc8(&t), rh[0], rh[1], crc8(&rh)]
}

/* ------------------------------------------------------------------------- */
/*  ADC                                                                      */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcFault;

/// Alternates `mid + amplitude` and `mid - amplitude`, whose AC RMS is
/// exactly `amplitude`.
pub struct SquareWave {
    mid: u16,
    amplitude: u16,
    high: bool,
    pub configured: Option<AdcConfig>,
    pub failing: bool,
}

impl SquareWave {
    pub fn new(mid: u16, amplitude: u16) -> Self {
        Self {
            mid,
            amplitude,
            high: false,
            configured: None,
            failing: false,
        }
    }
}

impl AnalogInput for SquareWave {
    type Error = AdcFault;

    fn configure(&mut self, config: &AdcConfig) -> Result<(), AdcFault> {
        self.configured = Some(*config);
        Ok(())
    }

    fn read_millivolts(&mut self) -> Result<u16, AdcFault> {
        if self.failing {
            return Err(AdcFault);
        }
        self.high = !self.high;
        Ok(if self.high {
            self.mid + self.amplitude
        } else {
            self.mid - self.amplitude
        })
    }
}

/* ------------------------------------------------------------------------- */
/*  Radios                                                                   */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioFault;

static STACK_INITS: AtomicU32 = AtomicU32::new(0);

/// Datagram stack bring-ups in this test binary, across every radio.
pub fn stack_inits() -> u32 {
    STACK_INITS.load(Ordering::SeqCst)
}

/// Datagram radio whose transmissions land straight in this process's
/// receive path, tagged with the sending station's address.
pub struct LoopbackRadio {
    pub address: PeerAddress,
    pub peers: Vec<PeerInfo>,
    pub sent: Vec<Vec<u8>>,
    pub refuse_sends: bool,
    pub deliver: bool,
    receive: Option<ReceiveCallback>,
    send_done: Option<SendCallback>,
}

impl LoopbackRadio {
    pub fn new(address: PeerAddress) -> Self {
        Self {
            address,
            peers: Vec::new(),
            sent: Vec::new(),
            refuse_sends: false,
            deliver: true,
            receive: None,
            send_done: None,
        }
    }

    pub fn has_receive_callback(&self) -> bool {
        self.receive.is_some()
    }
}

impl PeerRadio for LoopbackRadio {
    type Error = RadioFault;

    fn init_stack(&mut self) -> Result<(), RadioFault> {
        STACK_INITS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_receive_callback(&mut self, callback: ReceiveCallback) -> Result<(), RadioFault> {
        self.receive = Some(callback);
        Ok(())
    }

    fn register_send_callback(&mut self, callback: SendCallback) -> Result<(), RadioFault> {
        self.send_done = Some(callback);
        Ok(())
    }

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<(), RadioFault> {
        self.peers.push(*peer);
        Ok(())
    }

    fn send(&mut self, peer: &PeerAddress, frame: &[u8]) -> Result<(), RadioFault> {
        if self.refuse_sends {
            return Err(RadioFault);
        }
        self.sent.push(frame.to_vec());
        if self.deliver {
            on_peer_frame(&self.address, frame);
        }
        if let Some(done) = self.send_done {
            let status = if self.deliver {
                SendStatus::Delivered
            } else {
                SendStatus::Failed
            };
            done(peer, status);
        }
        Ok(())
    }
}

/// GATT peripheral that records what a subscribed host would have seen.
#[derive(Default)]
pub struct RecordingGatt {
    pub init_calls: u32,
    pub device_name: String,
    pub services: Vec<ServiceDefinition>,
    pub advertising_starts: u32,
    pub value: Vec<u8>,
    pub notifications: Vec<Vec<u8>>,
    pub refuse_notify: bool,
    /// Advertising starts to refuse before accepting again.
    pub refuse_advertising: u32,
}

impl GattPeripheral for RecordingGatt {
    type Error = RadioFault;

    fn init(&mut self, device_name: &str) -> Result<(), RadioFault> {
        self.init_calls += 1;
        self.device_name = device_name.to_string();
        Ok(())
    }

    fn add_service(&mut self, service: &ServiceDefinition) -> Result<(), RadioFault> {
        self.services.push(*service);
        Ok(())
    }

    fn start_advertising(&mut self, _advertisement: &Advertisement) -> Result<(), RadioFault> {
        if self.refuse_advertising > 0 {
            self.refuse_advertising -= 1;
            return Err(RadioFault);
        }
        self.advertising_starts += 1;
        Ok(())
    }

    fn set_value(&mut self, _characteristic: &Uuid128, value: &[u8]) -> Result<(), RadioFault> {
        self.value = value.to_vec();
        Ok(())
    }

    fn notify(&mut self, _characteristic: &Uuid128) -> Result<(), RadioFault> {
        if self.refuse_notify {
            return Err(RadioFault);
        }
        self.notifications.push(self.value.clone());
        Ok(())
    }
}
