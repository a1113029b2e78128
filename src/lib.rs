#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod bridge;
mod controller;
mod interrupts;
mod receive_buffer;
mod registers;
mod send_buffer;
mod state;
mod state_holder;
mod wire;

#[cfg(test)]
mod sim;

pub use bridge::{
    CountingSemaphore, ExecutionContext, PollingBridge, SemaphoreBridge, SyncBridge, Timeout,
    WaitStrategy,
};
pub use controller::{BusController, DEFAULT_CPU_HZ, HISTORY_SIZE, START_RETRIES};
pub use interrupts::handle_interrupt;
#[cfg(feature = "atmega328p")]
pub use registers::Atmega328pTwi;
pub use registers::{TwiRegisters, TWEA, TWEN, TWIE, TWINT, TWSTA, TWSTO};
pub use state::{classify, Class, TwiState, STATUS_MASK};
pub use wire::{Wire, BUFFER_LENGTH};

#[cfg(feature = "dump")]
pub use controller::StateDump;

/// R/W bit for a read transfer.
pub const I2C_READ: u8 = 1;
/// R/W bit for a write transfer.
pub const I2C_WRITE: u8 = 0;

/// Bus clock presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    /// 100 kHz.
    Standard,
    /// 400 kHz.
    Fast,
}

impl Speed {
    pub const fn hz(self) -> u32 {
        match self {
            Self::Standard => 100_000,
            Self::Fast => 400_000,
        }
    }
}

/// State of the internal SDA/SCL pull-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pullups {
    Disabled,
    Internal,
}

/// How a transfer ends once its last byte has been moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Release the bus with a STOP condition.
    Stop,
    /// Keep the bus with a repeated START; the next `transfer` skips its START.
    RepeatedStart,
    /// Keep the bus without any condition; go on with `transfer_continue`.
    Continue,
}

impl Completion {
    /// Whether the last byte of a read must be answered with NACK.
    pub(crate) const fn nacks_last_byte(self) -> bool {
        matches!(self, Self::Stop | Self::RepeatedStart)
    }
}

/// Status and control register snapshot taken when a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailureRecord {
    /// Masked `TWSR` value, or [`TwiState::StartTimeout`].
    pub state: u8,
    /// `TWCR` at the time of failure.
    pub control: u8,
}

impl FailureRecord {
    pub(crate) const NONE: Self = Self {
        state: TwiState::NoState as u8,
        control: 0,
    };

    pub fn twi_state(&self) -> Option<TwiState> {
        TwiState::from_bits(self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reason {
    /// No device answered the address.
    AddressNack,
    /// The device rejected a data byte.
    DataNack,
    /// Another master won the bus.
    ArbitrationLost,
    /// Illegal START or STOP seen on the bus.
    BusError,
    /// The START condition never completed.
    StartTimeout,
    /// A status the driver does not expect at this point.
    Unexpected(u8),
}

impl Reason {
    pub const fn from_state(state: u8) -> Self {
        match TwiState::from_bits(state) {
            Some(TwiState::MtxAddrNack | TwiState::MrxAddrNack) => Self::AddressNack,
            Some(TwiState::MtxDataNack) => Self::DataNack,
            Some(TwiState::ArbitrationLost) => Self::ArbitrationLost,
            Some(TwiState::BusError) => Self::BusError,
            Some(TwiState::StartTimeout) => Self::StartTimeout,
            _ => Self::Unexpected(state),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    #[cfg(feature = "dump")]
    pub dump: StateDump,
    pub reason: Reason,
    pub record: FailureRecord,
}
