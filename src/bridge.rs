//! Completion hand-off between the TWI interrupt and the waiting thread.

use core::hint;

/// Timeout argument of [`CountingSemaphore::wait_timeout`], in scheduler ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    Immediate,
    Ticks(u32),
    Infinite,
}

/// Counting semaphore supplied by the RTOS kernel.
///
/// Implementations are created with an initial count of zero.
pub trait CountingSemaphore {
    /// Increments the count, waking one waiter. Interrupt-safe.
    fn signal_from_isr(&self);

    /// Decrements the count, blocking up to `timeout` while it is zero.
    /// Returns `false` if the timeout expired first.
    fn wait_timeout(&self, timeout: Timeout) -> bool;

    fn count(&self) -> i32;
}

/// Tells whether the calling context may be suspended.
///
/// The kernel's idle thread must answer `false`: nothing else could resume it.
pub trait ExecutionContext {
    fn may_block(&self) -> bool;
}

/// Carries the end-of-transaction signal from interrupt to thread context.
pub trait SyncBridge {
    /// Called exactly once per transaction, from the interrupt handler, after
    /// the final bus condition has been issued.
    fn signal(&self);

    /// Called from thread context; returns once the transaction is finished.
    /// `busy` reads the hardware busy indicator.
    fn wait<F: Fn() -> bool>(&self, busy: F);
}

/// Bridge without a scheduler: `signal` does nothing and `wait` spins on the
/// busy indicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollingBridge;

impl SyncBridge for PollingBridge {
    fn signal(&self) {}

    fn wait<F: Fn() -> bool>(&self, busy: F) {
        while busy() {
            hint::spin_loop();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitStrategy {
    /// Suspend on the semaphore.
    Block,
    /// Spin on the busy indicator, then take the signal without blocking.
    Spin,
}

/// Bridge backed by an RTOS counting semaphore.
pub struct SemaphoreBridge<S: CountingSemaphore, C: ExecutionContext> {
    semaphore: S,
    context: C,
}

impl<S: CountingSemaphore, C: ExecutionContext> SemaphoreBridge<S, C> {
    pub const fn new(semaphore: S, context: C) -> Self {
        Self { semaphore, context }
    }

    pub fn strategy(&self) -> WaitStrategy {
        if self.context.may_block() {
            WaitStrategy::Block
        } else {
            WaitStrategy::Spin
        }
    }

    pub fn semaphore(&self) -> &S {
        &self.semaphore
    }
}

impl<S: CountingSemaphore, C: ExecutionContext> SyncBridge for SemaphoreBridge<S, C> {
    fn signal(&self) {
        self.semaphore.signal_from_isr();
    }

    fn wait<F: Fn() -> bool>(&self, busy: F) {
        match self.strategy() {
            WaitStrategy::Block => {
                while !self.semaphore.wait_timeout(Timeout::Infinite) {}
            }
            WaitStrategy::Spin => {
                while busy() {
                    hint::spin_loop();
                }
                // The handler clears TWIE just before it signals.
                while !self.semaphore.wait_timeout(Timeout::Immediate) {
                    hint::spin_loop();
                }
            }
        }
    }
}
