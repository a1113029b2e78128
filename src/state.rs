//! TWI status codes reported in the upper five bits of `TWSR`.
//!
//! Only the master-mode subset is listed; slave-mode codes decode to `None`
//! and are treated as unexpected by the driver.

use core::fmt;

/// Mask selecting the status bits of `TWSR` (the low bits hold the prescaler).
pub const STATUS_MASK: u8 = 0xF8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TwiState {
    /// START has been transmitted.
    Start = 0x08,
    /// Repeated START has been transmitted.
    RepeatedStart = 0x10,
    /// Arbitration lost.
    ArbitrationLost = 0x38,
    /// SLA+W has been transmitted and ACK received.
    MtxAddrAck = 0x18,
    /// SLA+W has been transmitted and NACK received.
    MtxAddrNack = 0x20,
    /// Data byte has been transmitted and ACK received.
    MtxDataAck = 0x28,
    /// Data byte has been transmitted and NACK received.
    MtxDataNack = 0x30,
    /// SLA+R has been transmitted and ACK received.
    MrxAddrAck = 0x40,
    /// SLA+R has been transmitted and NACK received.
    MrxAddrNack = 0x48,
    /// Data byte has been received and ACK transmitted.
    MrxDataAck = 0x50,
    /// Data byte has been received and NACK transmitted.
    MrxDataNack = 0x58,
    /// No relevant state information available; TWINT is clear.
    NoState = 0xF8,
    /// Bus error due to an illegal START or STOP condition.
    BusError = 0x00,
    /// Software code: the START condition never completed.
    StartTimeout = 0xD0,
}

/// Semantic class of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Class {
    /// The transaction can go on from here.
    Progress,
    /// Nothing further happens without a new command.
    Terminal,
    /// The transaction has failed.
    Failure,
}

impl TwiState {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x08 => Self::Start,
            0x10 => Self::RepeatedStart,
            0x38 => Self::ArbitrationLost,
            0x18 => Self::MtxAddrAck,
            0x20 => Self::MtxAddrNack,
            0x28 => Self::MtxDataAck,
            0x30 => Self::MtxDataNack,
            0x40 => Self::MrxAddrAck,
            0x48 => Self::MrxAddrNack,
            0x50 => Self::MrxDataAck,
            0x58 => Self::MrxDataNack,
            0xF8 => Self::NoState,
            0x00 => Self::BusError,
            0xD0 => Self::StartTimeout,
            _ => return None,
        })
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn class(self) -> Class {
        match self {
            Self::Start
            | Self::RepeatedStart
            | Self::MtxAddrAck
            | Self::MtxDataAck
            | Self::MrxAddrAck
            | Self::MrxDataAck => Class::Progress,
            Self::MrxDataNack | Self::NoState => Class::Terminal,
            Self::ArbitrationLost
            | Self::MtxAddrNack
            | Self::MtxDataNack
            | Self::MrxAddrNack
            | Self::BusError
            | Self::StartTimeout => Class::Failure,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "A START has been transmitted.",
            Self::RepeatedStart => "A Repeated START has been transmitted.",
            Self::ArbitrationLost => "Arbitration lost.",
            Self::MtxAddrAck => "SLA+W has been transmitted and ACK received.",
            Self::MtxAddrNack => "SLA+W has been transmitted and NACK received.",
            Self::MtxDataAck => "Data byte has been transmitted and ACK received.",
            Self::MtxDataNack => "Data byte has been transmitted and NACK received.",
            Self::MrxAddrAck => "SLA+R has been transmitted and ACK received.",
            Self::MrxAddrNack => "SLA+R has been transmitted and NACK received.",
            Self::MrxDataAck => "Data byte has been received and ACK transmitted.",
            Self::MrxDataNack => "Data byte has been received and NACK transmitted.",
            Self::NoState => "Stop condition or bus busy; TWINT == 0.",
            Self::BusError => "Bus error due to an illegal START or STOP condition.",
            Self::StartTimeout => "Start condition timeout.  Pull-up problem?",
        }
    }
}

impl TryFrom<u8> for TwiState {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, u8> {
        Self::from_bits(bits).ok_or(bits)
    }
}

impl fmt::Display for TwiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0X{:X}, {}", self.bits(), self.description())
    }
}

/// Classifies a raw status byte; codes outside the catalog are failures.
pub fn classify(bits: u8) -> Class {
    TwiState::from_bits(bits).map_or(Class::Failure, TwiState::class)
}
