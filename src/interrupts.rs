use critical_section::CriticalSection;

use crate::{
    bridge::SyncBridge,
    controller::{BusController, Outcome, Transaction},
    registers::{Command, TwiRegisters},
    state::{classify, Class, TwiState, STATUS_MASK},
    Completion,
};

/// TWI interrupt entry point; call it from the peripheral's vector.
pub fn handle_interrupt<R: TwiRegisters, B: SyncBridge>(bus: &BusController<R, B>) {
    let done = critical_section::with(|cs| step(bus, cs));

    if done {
        bus.bridge.signal();
    }
}

/// Advances the transfer by one bus event. Returns `true` once the
/// transaction has reached a terminal state and the waiter must be signalled.
fn step<R: TwiRegisters, B: SyncBridge>(bus: &BusController<R, B>, cs: CriticalSection) -> bool {
    let regs = &bus.regs;
    let state = regs.twsr() & STATUS_MASK;
    bus.states.record(cs, state);
    trace!("twi isr: state {:#x}", state);

    let mut t = bus.transaction.borrow_ref_mut(cs);
    if !t.is_open() {
        warn!("twi isr: no transfer open in state {:#x}", state);
        regs.set_twcr(Command::Stop.bits());
        return false;
    }

    if classify(state) == Class::Failure {
        drop(t);
        return fail(bus, cs, state);
    }

    match TwiState::from_bits(state) {
        Some(TwiState::MtxAddrAck | TwiState::MtxDataAck) => match t.next_outgoing() {
            Some(byte) => {
                regs.set_twdr(byte);
                regs.set_twcr(Command::Transmit.bits());
                false
            }
            None => finish(bus, &mut t),
        },
        Some(TwiState::MrxDataAck) => {
            if t.store(regs.twdr()).is_err() {
                drop(t);
                return fail(bus, cs, state);
            }
            request_next(bus, &mut t)
        }
        Some(TwiState::MrxAddrAck) => request_next(bus, &mut t),
        Some(TwiState::MrxDataNack) => {
            if t.store(regs.twdr()).is_err() {
                drop(t);
                return fail(bus, cs, state);
            }
            finish(bus, &mut t)
        }
        _ => {
            drop(t);
            fail(bus, cs, state)
        }
    }
}

/// Arms reception of the next byte, choosing its ACK bit.
fn request_next<R: TwiRegisters, B: SyncBridge>(
    bus: &BusController<R, B>,
    t: &mut Transaction,
) -> bool {
    let cmd = match t.remaining() {
        0 => return finish(bus, t),
        1 if t.option.nacks_last_byte() => Command::ReceiveNack,
        _ => Command::ReceiveAck,
    };
    bus.regs.set_twcr(cmd.bits());
    false
}

fn finish<R: TwiRegisters, B: SyncBridge>(bus: &BusController<R, B>, t: &mut Transaction) -> bool {
    let cmd = match t.option {
        Completion::Stop => Command::Stop,
        Completion::RepeatedStart => Command::RepeatedStart,
        Completion::Continue => Command::Hold,
    };
    bus.regs.set_twcr(cmd.bits());
    t.close();
    bus.outcome.store(Outcome::Success, atomic::Ordering::SeqCst);
    trace!("twi isr: done, {} bytes", t.index);
    true
}

/// Records the failure and forces a STOP so the bus is left idle.
fn fail<R: TwiRegisters, B: SyncBridge>(
    bus: &BusController<R, B>,
    cs: CriticalSection,
    state: u8,
) -> bool {
    bus.record_failure(cs, state);
    bus.regs.set_twcr(Command::Stop.bits());
    bus.transaction.borrow_ref_mut(cs).close();
    bus.outcome.store(Outcome::Failure, atomic::Ordering::SeqCst);
    true
}
