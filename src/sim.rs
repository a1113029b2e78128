//! Simulated TWI peripheral and RTOS pieces for the unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Condvar, Mutex,
    },
    thread,
    time::Duration,
};

use crate::{
    bridge::{CountingSemaphore, ExecutionContext, SyncBridge, Timeout},
    controller::BusController,
    interrupts::handle_interrupt,
    registers::{TwiRegisters, TWEA, TWEN, TWIE, TWINT, TWSTA, TWSTO},
    state::TwiState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    RepeatedStart,
    /// Raw address byte, R/W bit included.
    Address(u8),
    Write(u8),
    Read { byte: u8, ack: bool },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// START never completes, as with missing pull-ups.
    StuckStart,
    /// Bus action number `after` (0 = address) reports arbitration loss.
    ArbitrationLost { after: usize },
    /// Bus action number `after` reports a bus error.
    BusError { after: usize },
}

/// 256-byte register file addressed by the first written byte.
#[derive(Debug, Clone)]
pub struct RegisterDevice {
    memory: [u8; 256],
    pointer: u8,
    expect_pointer: bool,
    written: usize,
    nack_after: Option<usize>,
}

impl RegisterDevice {
    pub fn new() -> Self {
        Self {
            memory: [0; 256],
            pointer: 0,
            expect_pointer: false,
            written: 0,
            nack_after: None,
        }
    }

    pub fn with_contents(contents: &[u8]) -> Self {
        let mut dev = Self::new();
        dev.memory[..contents.len()].copy_from_slice(contents);
        dev
    }

    /// Accept `count` bytes of each write, then NACK.
    pub fn nack_write_after(mut self, count: usize) -> Self {
        self.nack_after = Some(count);
        self
    }

    fn address(&mut self, read: bool) {
        if !read {
            self.expect_pointer = true;
            self.written = 0;
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.nack_after.is_some_and(|n| self.written >= n) {
            return false;
        }
        self.written += 1;
        if self.expect_pointer {
            self.pointer = byte;
            self.expect_pointer = false;
        } else {
            self.memory[self.pointer as usize] = byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
        true
    }

    fn read(&mut self) -> u8 {
        let byte = self.memory[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        byte
    }
}

struct Inner {
    twcr: u8,
    twint: bool,
    status: u8,
    prescaler: u8,
    twdr: u8,
    twbr: u8,
    pullups: bool,

    owned: bool,
    target: Option<u8>,
    devices: Vec<(u8, RegisterDevice)>,
    fault: Option<Fault>,
    actions: usize,

    events: Vec<BusEvent>,
    control_writes: Vec<u8>,
}

impl Inner {
    fn device(&mut self, address: u8) -> Option<&mut RegisterDevice> {
        self.devices
            .iter_mut()
            .find(|(a, _)| *a == address)
            .map(|(_, d)| d)
    }

    fn injected(&self) -> Option<(u8, bool)> {
        match self.fault {
            Some(Fault::ArbitrationLost { after }) if after == self.actions => {
                Some((TwiState::ArbitrationLost as u8, true))
            }
            Some(Fault::BusError { after }) if after == self.actions => {
                Some((TwiState::BusError as u8, false))
            }
            _ => None,
        }
    }

    /// What the hardware does once software clears TWINT.
    fn act(&mut self, control: u8) {
        if control & TWSTA != 0 {
            if self.fault == Some(Fault::StuckStart) {
                return;
            }
            if self.owned {
                self.events.push(BusEvent::RepeatedStart);
                self.status = TwiState::RepeatedStart as u8;
            } else {
                self.events.push(BusEvent::Start);
                self.status = TwiState::Start as u8;
            }
            self.owned = true;
            self.target = None;
            self.twint = true;
            return;
        }

        if control & TWSTO != 0 {
            self.events.push(BusEvent::Stop);
            self.owned = false;
            self.target = None;
            self.status = TwiState::NoState as u8;
            return;
        }

        if let Some((status, lost)) = self.injected() {
            self.actions += 1;
            self.status = status;
            if lost {
                self.owned = false;
            }
            self.twint = true;
            return;
        }
        self.actions += 1;

        match TwiState::from_bits(self.status) {
            Some(TwiState::Start | TwiState::RepeatedStart) => {
                let addr = self.twdr;
                let read = addr & 1 != 0;
                self.events.push(BusEvent::Address(addr));
                let ack = match self.device(addr >> 1) {
                    Some(dev) => {
                        dev.address(read);
                        true
                    }
                    None => false,
                };
                self.target = ack.then_some(addr >> 1);
                self.status = match (read, ack) {
                    (false, true) => TwiState::MtxAddrAck,
                    (false, false) => TwiState::MtxAddrNack,
                    (true, true) => TwiState::MrxAddrAck,
                    (true, false) => TwiState::MrxAddrNack,
                } as u8;
            }
            Some(TwiState::MtxAddrAck | TwiState::MtxDataAck) => {
                let byte = self.twdr;
                self.events.push(BusEvent::Write(byte));
                let ack = match self.target {
                    Some(t) => self.device(t).is_some_and(|d| d.write(byte)),
                    None => false,
                };
                self.status = if ack {
                    TwiState::MtxDataAck
                } else {
                    TwiState::MtxDataNack
                } as u8;
            }
            Some(TwiState::MrxAddrAck | TwiState::MrxDataAck) => {
                let byte = match self.target {
                    Some(t) => self.device(t).map_or(0xFF, |d| d.read()),
                    None => 0xFF,
                };
                let ack = control & TWEA != 0;
                self.twdr = byte;
                self.events.push(BusEvent::Read { byte, ack });
                self.status = if ack {
                    TwiState::MrxDataAck
                } else {
                    TwiState::MrxDataNack
                } as u8;
            }
            _ => {
                self.status = TwiState::NoState as u8;
                return;
            }
        }
        self.twint = true;
    }
}

/// A TWI block with devices hanging off its bus.
pub struct SimTwi {
    inner: Mutex<Inner>,
}

impl SimTwi {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                twcr: 0,
                twint: false,
                status: TwiState::NoState as u8,
                prescaler: 0,
                twdr: 0xFF,
                twbr: 0,
                pullups: false,
                owned: false,
                target: None,
                devices: Vec::new(),
                fault: None,
                actions: 0,
                events: Vec::new(),
                control_writes: Vec::new(),
            }),
        }
    }

    pub fn attach(&self, address: u8, device: RegisterDevice) {
        self.inner.lock().unwrap().devices.push((address, device));
    }

    pub fn inject(&self, fault: Fault) {
        self.inner.lock().unwrap().fault = Some(fault);
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn control_writes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().control_writes.clone()
    }

    pub fn pullups(&self) -> bool {
        self.inner.lock().unwrap().pullups
    }

    pub fn device_memory(&self, address: u8, start: usize, len: usize) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        let dev = inner.device(address).expect("no such device");
        dev.memory[start..start + len].to_vec()
    }

    pub fn interrupt_pending(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.twint && inner.twcr & (TWEN | TWIE) == TWEN | TWIE
    }

    /// Runs `f` while another thread plays the interrupt line of `bus`.
    pub fn with_interrupts<B: SyncBridge + Sync, T>(
        &self,
        bus: &BusController<&SimTwi, B>,
        f: impl FnOnce() -> T,
    ) -> T {
        struct StopOnDrop<'a>(&'a AtomicBool);
        impl Drop for StopOnDrop<'_> {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let done = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    if self.interrupt_pending() {
                        handle_interrupt(bus);
                    } else {
                        thread::yield_now();
                    }
                }
            });
            let _stop = StopOnDrop(&done);
            f()
        })
    }
}

impl TwiRegisters for SimTwi {
    fn twcr(&self) -> u8 {
        let inner = self.inner.lock().unwrap();
        inner.twcr | if inner.twint { TWINT } else { 0 }
    }

    fn set_twcr(&self, value: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.control_writes.push(value);
        inner.twcr = value & !(TWINT | TWSTO);
        if value & TWEN == 0 || value & TWINT == 0 {
            return;
        }
        inner.twint = false;
        inner.act(value);
    }

    fn twsr(&self) -> u8 {
        let inner = self.inner.lock().unwrap();
        inner.status | inner.prescaler
    }

    fn set_twsr(&self, value: u8) {
        self.inner.lock().unwrap().prescaler = value & 0x03;
    }

    fn twdr(&self) -> u8 {
        self.inner.lock().unwrap().twdr
    }

    fn set_twdr(&self, value: u8) {
        self.inner.lock().unwrap().twdr = value;
    }

    fn twbr(&self) -> u8 {
        self.inner.lock().unwrap().twbr
    }

    fn set_twbr(&self, value: u8) {
        self.inner.lock().unwrap().twbr = value;
    }

    fn set_pullups(&self, enabled: bool) {
        self.inner.lock().unwrap().pullups = enabled;
    }
}

/// Counting semaphore on top of `std` primitives.
pub struct StdSemaphore {
    count: Mutex<i32>,
    cond: Condvar,
    blocking_waits: AtomicUsize,
}

impl StdSemaphore {
    pub fn new(count: i32) -> Self {
        Self {
            count: Mutex::new(count),
            cond: Condvar::new(),
            blocking_waits: AtomicUsize::new(0),
        }
    }

    /// Number of waits that were allowed to suspend the caller.
    pub fn blocking_waits(&self) -> usize {
        self.blocking_waits.load(Ordering::SeqCst)
    }
}

impl CountingSemaphore for StdSemaphore {
    fn signal_from_isr(&self) {
        *self.count.lock().unwrap() += 1;
        self.cond.notify_one();
    }

    fn wait_timeout(&self, timeout: Timeout) -> bool {
        let mut count = self.count.lock().unwrap();
        match timeout {
            Timeout::Immediate => {}
            Timeout::Ticks(ms) => {
                self.blocking_waits.fetch_add(1, Ordering::SeqCst);
                count = self
                    .cond
                    .wait_timeout_while(count, Duration::from_millis(ms.into()), |c| *c <= 0)
                    .unwrap()
                    .0;
            }
            Timeout::Infinite => {
                self.blocking_waits.fetch_add(1, Ordering::SeqCst);
                count = self.cond.wait_while(count, |c| *c <= 0).unwrap();
            }
        }
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn count(&self) -> i32 {
        *self.count.lock().unwrap()
    }
}

pub struct Context {
    may_block: bool,
}

impl Context {
    pub fn thread() -> Self {
        Self { may_block: true }
    }

    pub fn idle() -> Self {
        Self { may_block: false }
    }
}

impl ExecutionContext for Context {
    fn may_block(&self) -> bool {
        self.may_block
    }
}
