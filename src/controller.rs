use core::{
    cell::{Cell, RefCell},
    ptr::NonNull,
};

use atomic::{Atomic, Ordering};
use critical_section::{CriticalSection, Mutex};

use crate::{
    bridge::SyncBridge,
    registers::{Command, TwiRegisters, TWIE, TWINT},
    state::{TwiState, STATUS_MASK},
    state_holder::StateHolder,
    Completion, Error, FailureRecord, Pullups, Reason, Speed,
};

/// Polls of `TWINT` before a START is declared failed.
pub const START_RETRIES: u16 = 1000;
pub const HISTORY_SIZE: usize = 16;
pub const DEFAULT_CPU_HZ: u32 = 16_000_000;

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateDump {
    /// Oldest first; only the first `len` entries are meaningful.
    pub state_history: [u8; HISTORY_SIZE],
    pub len: usize,
    pub current_state: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[repr(u8)]
pub(crate) enum Outcome {
    Idle,
    Pending,
    Success,
    Failure,
}

/// The open transfer, shared with the interrupt handler.
pub(crate) struct Transaction {
    /// Caller's buffer; `None` once the transaction is closed.
    buf: Option<NonNull<u8>>,
    pub(crate) len: usize,
    pub(crate) index: usize,
    pub(crate) option: Completion,
}

// SAFETY: the pointer is only dereferenced inside a critical section while the
// thread that lent the buffer is still inside `transfer`/`transfer_continue`,
// and every return path of those calls closes the transaction first.
unsafe impl Send for Transaction {}

impl Transaction {
    const fn new() -> Self {
        Self {
            buf: None,
            len: 0,
            index: 0,
            option: Completion::Stop,
        }
    }

    fn open(&mut self, buf: &mut [u8], len: usize, option: Completion) {
        self.buf = NonNull::new(buf.as_mut_ptr());
        self.len = len;
        self.index = 0;
        self.option = option;
    }

    pub(crate) fn close(&mut self) {
        self.buf = None;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.buf.is_some()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.len - self.index
    }

    /// Next byte to send, advancing the index.
    pub(crate) fn next_outgoing(&mut self) -> Option<u8> {
        let buf = self.buf?;
        if self.index >= self.len {
            return None;
        }
        // SAFETY: index < len <= buffer length, buffer alive while open.
        let byte = unsafe { *buf.as_ptr().add(self.index) };
        self.index += 1;
        Some(byte)
    }

    /// Stores a received byte. Fails if the request is already satisfied.
    pub(crate) fn store(&mut self, byte: u8) -> Result<(), ()> {
        let buf = self.buf.ok_or(())?;
        if self.index >= self.len {
            return Err(());
        }
        // SAFETY: as in `next_outgoing`.
        unsafe { *buf.as_ptr().add(self.index) = byte };
        self.index += 1;
        Ok(())
    }
}

/// Master-mode driver for one TWI peripheral.
///
/// Meant to live in a `static` next to the interrupt vector, which forwards
/// to [`handle_interrupt`](crate::handle_interrupt). At most one transfer may
/// be in flight; callers on different threads must serialize themselves.
pub struct BusController<R: TwiRegisters, B: SyncBridge> {
    pub(crate) regs: R,
    pub(crate) bridge: B,
    cpu_hz: u32,

    pub(crate) transaction: Mutex<RefCell<Transaction>>,
    pub(crate) outcome: Atomic<Outcome>,
    pub(crate) failure: Mutex<Cell<FailureRecord>>,
    pub(crate) states: StateHolder<HISTORY_SIZE>,
}

impl<R: TwiRegisters, B: SyncBridge> BusController<R, B> {
    pub const fn new(regs: R, bridge: B, cpu_hz: u32) -> Self {
        Self {
            regs,
            bridge,
            cpu_hz,
            transaction: Mutex::new(RefCell::new(Transaction::new())),
            outcome: Atomic::new(Outcome::Idle),
            failure: Mutex::new(Cell::new(FailureRecord::NONE)),
            states: StateHolder::new(),
        }
    }

    /// Configures clock and pull-ups. Must not be called during a transfer.
    pub fn begin(&self, speed: Speed, pullups: Pullups) {
        self.set_pullups(pullups);
        self.set_speed(speed);
        // The peripheral is not enabled here: the first START sets TWEN.
        debug!("twi: begin at {} Hz", self.bus_speed());
    }

    pub fn set_speed(&self, speed: Speed) {
        self.regs.set_twsr(0);
        self.regs.set_twbr(bit_rate(self.cpu_hz, speed.hz()));
    }

    pub fn set_pullups(&self, pullups: Pullups) {
        self.regs.set_pullups(pullups == Pullups::Internal);
    }

    /// SCL frequency for the current `TWBR` with prescaler 1.
    pub fn bus_speed(&self) -> u32 {
        self.cpu_hz / (2 * self.regs.twbr() as u32 + 16)
    }

    /// Starts a transfer to `addr_rw` (address in the high seven bits, R/W
    /// bit in bit 0) moving at most `len` bytes of `buf`.
    ///
    /// Blocks in the [`SyncBridge`] until the interrupt handler is done.
    pub fn transfer(
        &self,
        addr_rw: u8,
        buf: &mut [u8],
        len: usize,
        option: Completion,
    ) -> Result<(), Error> {
        let len = len.min(buf.len());
        debug!("twi: transfer addr_rw={:#x} len={}", addr_rw, len);

        critical_section::with(|cs| {
            self.transaction.borrow_ref_mut(cs).open(buf, len, option);
            self.states.clear(cs);
        });
        self.outcome.store(Outcome::Pending, Ordering::SeqCst);

        if self.current_state() != TwiState::RepeatedStart as u8 {
            self.regs.set_twcr(Command::Start.bits());
            let started = (0..START_RETRIES).any(|_| self.regs.twcr() & TWINT != 0);
            if !started {
                return Err(critical_section::with(|cs| {
                    self.abandon(cs, TwiState::StartTimeout as u8)
                }));
            }
        }

        self.regs.set_twdr(addr_rw);
        self.regs.set_twcr(Command::Transmit.bits());

        self.bridge.wait(|| self.is_busy());
        self.settle()
    }

    /// Moves more bytes on a bus still held by a [`Completion::Continue`]
    /// transfer, without a new START or address.
    pub fn transfer_continue(
        &self,
        buf: &mut [u8],
        len: usize,
        option: Completion,
    ) -> Result<(), Error> {
        let len = len.min(buf.len());
        let state = self.current_state();
        debug!("twi: continue len={} from state {:#x}", len, state);

        let started = critical_section::with(|cs| {
            let mut t = self.transaction.borrow_ref_mut(cs);
            t.open(buf, len, option);
            self.states.clear(cs);

            if len == 0 {
                t.close();
                self.outcome.store(Outcome::Success, Ordering::SeqCst);
                return Ok(false);
            }
            self.outcome.store(Outcome::Pending, Ordering::SeqCst);

            match TwiState::from_bits(state) {
                Some(TwiState::MtxAddrAck | TwiState::MtxDataAck) => {
                    if let Some(byte) = t.next_outgoing() {
                        self.regs.set_twdr(byte);
                    }
                    self.regs.set_twcr(Command::Transmit.bits());
                }
                Some(TwiState::MrxAddrAck | TwiState::MrxDataAck) => {
                    let cmd = if len == 1 && option.nacks_last_byte() {
                        Command::ReceiveNack
                    } else {
                        Command::ReceiveAck
                    };
                    self.regs.set_twcr(cmd.bits());
                }
                _ => {
                    drop(t);
                    return Err(self.abandon(cs, state));
                }
            }
            Ok(true)
        })?;

        if started {
            self.bridge.wait(|| self.is_busy());
        }
        self.settle()
    }

    /// Closes the transaction after the bridge returned.
    fn settle(&self) -> Result<(), Error> {
        critical_section::with(|cs| {
            if self.transaction.borrow_ref(cs).is_open() {
                // The bridge returned before the handler finished.
                error!("twi: wait returned with transfer in flight");
                self.regs.set_twcr(Command::Stop.bits());
                let state = self.current_state();
                return Err(self.abandon(cs, state));
            }
            match self.outcome.load(Ordering::SeqCst) {
                Outcome::Success => Ok(()),
                _ => Err(self.error(cs)),
            }
        })
    }

    /// Records a failure seen outside the interrupt path and closes the
    /// transaction without touching the bus.
    fn abandon(&self, cs: CriticalSection, state: u8) -> Error {
        self.record_failure(cs, state);
        self.transaction.borrow_ref_mut(cs).close();
        self.outcome.store(Outcome::Failure, Ordering::SeqCst);
        self.error(cs)
    }

    pub(crate) fn record_failure(&self, cs: CriticalSection, state: u8) {
        let control = self.regs.twcr();
        warn!("twi: failed in state {:#x}, TWCR={:#x}", state, control);
        self.failure
            .borrow(cs)
            .set(FailureRecord { state, control });
    }

    fn error(&self, cs: CriticalSection) -> Error {
        let record = self.failure.borrow(cs).get();
        Error {
            #[cfg(feature = "dump")]
            dump: self.dump_state(cs),
            reason: Reason::from_state(record.state),
            record,
        }
    }

    #[cfg(feature = "dump")]
    fn dump_state(&self, cs: CriticalSection) -> StateDump {
        let mut dump = StateDump {
            state_history: [0; HISTORY_SIZE],
            len: 0,
            current_state: self.current_state(),
        };
        for (slot, state) in dump
            .state_history
            .iter_mut()
            .zip(self.states.get_history(cs).iter())
        {
            *slot = *state;
            dump.len += 1;
        }
        dump
    }

    /// Whether the interrupt path is armed, i.e. a transfer is in flight.
    pub fn is_busy(&self) -> bool {
        self.regs.twcr() & TWIE != 0
    }

    /// Masked `TWSR`.
    pub fn current_state(&self) -> u8 {
        self.regs.twsr() & STATUS_MASK
    }

    /// Status recorded by the last failed transfer.
    pub fn failure_state(&self) -> u8 {
        self.failure().state
    }

    /// `TWCR` recorded by the last failed transfer.
    pub fn failure_control(&self) -> u8 {
        self.failure().control
    }

    pub fn failure(&self) -> FailureRecord {
        critical_section::with(|cs| self.failure.borrow(cs).get())
    }

    /// Whether the last transfer succeeded.
    pub fn return_status(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) == Outcome::Success
    }

    /// Byte count requested by the last transfer, after clamping.
    pub fn request_size(&self) -> usize {
        critical_section::with(|cs| self.transaction.borrow_ref(cs).len)
    }

    /// Bytes actually moved by the last transfer.
    pub fn bytes_transferred(&self) -> usize {
        critical_section::with(|cs| self.transaction.borrow_ref(cs).index)
    }

    /// Status codes handled by the interrupt during the last transfer.
    pub fn state_history(&self) -> heapless::Vec<u8, HISTORY_SIZE> {
        critical_section::with(|cs| self.states.get_history(cs).iter().copied().collect())
    }
}

/// `TWBR` for `scl_hz`, saturated to the register width.
const fn bit_rate(cpu_hz: u32, scl_hz: u32) -> u8 {
    let twbr = (cpu_hz / scl_hz).saturating_sub(16) / 2;
    if twbr > u8::MAX as u32 {
        u8::MAX
    } else {
        twbr as u8
    }
}
