//! TWI register access.

/// TWI Interrupt Flag.
pub const TWINT: u8 = 0x80;
/// TWI Enable Acknowledge.
pub const TWEA: u8 = 0x40;
/// TWI START Condition.
pub const TWSTA: u8 = 0x20;
/// TWI STOP Condition.
pub const TWSTO: u8 = 0x10;
/// TWI Enable.
pub const TWEN: u8 = 0x04;
/// TWI Interrupt Enable.
pub const TWIE: u8 = 0x01;

/// The TWI register set of one peripheral instance.
///
/// Implementations must perform volatile accesses; the controller relies on
/// every `TWCR` write reaching the hardware in program order.
pub trait TwiRegisters {
    fn twcr(&self) -> u8;
    fn set_twcr(&self, value: u8);

    fn twsr(&self) -> u8;
    fn set_twsr(&self, value: u8);

    fn twdr(&self) -> u8;
    fn set_twdr(&self, value: u8);

    fn twbr(&self) -> u8;
    fn set_twbr(&self, value: u8);

    /// Drive the internal pull-ups on SDA and SCL.
    fn set_pullups(&self, enabled: bool);
}

impl<T: TwiRegisters + ?Sized> TwiRegisters for &T {
    fn twcr(&self) -> u8 {
        (**self).twcr()
    }
    fn set_twcr(&self, value: u8) {
        (**self).set_twcr(value)
    }
    fn twsr(&self) -> u8 {
        (**self).twsr()
    }
    fn set_twsr(&self, value: u8) {
        (**self).set_twsr(value)
    }
    fn twdr(&self) -> u8 {
        (**self).twdr()
    }
    fn set_twdr(&self, value: u8) {
        (**self).set_twdr(value)
    }
    fn twbr(&self) -> u8 {
        (**self).twbr()
    }
    fn set_twbr(&self, value: u8) {
        (**self).set_twbr(value)
    }
    fn set_pullups(&self, enabled: bool) {
        (**self).set_pullups(enabled)
    }
}

/// `TWCR` values written by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Command {
    /// Issue a START with interrupts disabled; the caller polls `TWINT`.
    Start,
    /// Clock out `TWDR` (address or data) and interrupt when done.
    Transmit,
    /// Receive a byte and answer with ACK.
    ReceiveAck,
    /// Receive a byte and answer with NACK.
    ReceiveNack,
    /// Issue STOP and leave interrupts disabled.
    Stop,
    /// Issue a repeated START and leave interrupts disabled.
    RepeatedStart,
    /// Keep the bus held: `TWINT` stays set, no interrupt.
    Hold,
}

impl Command {
    pub(crate) const fn bits(self) -> u8 {
        match self {
            Self::Start => TWEN | TWINT | TWSTA,
            Self::Transmit | Self::ReceiveNack => TWEN | TWIE | TWINT,
            Self::ReceiveAck => TWEN | TWIE | TWINT | TWEA,
            Self::Stop => TWEN | TWINT | TWSTO,
            Self::RepeatedStart => TWEN | TWINT | TWSTA,
            Self::Hold => TWEN,
        }
    }
}

#[cfg(feature = "atmega328p")]
pub use self::atmega328p::Atmega328pTwi;

#[cfg(feature = "atmega328p")]
mod atmega328p {
    use super::TwiRegisters;

    const TWBR: *mut u8 = 0x00B8 as *mut u8;
    const TWSR: *mut u8 = 0x00B9 as *mut u8;
    const TWDR: *mut u8 = 0x00BB as *mut u8;
    const TWCR: *mut u8 = 0x00BC as *mut u8;
    const PORTC: *mut u8 = 0x0028 as *mut u8;

    const SDA: u8 = 1 << 4;
    const SCL: u8 = 1 << 5;

    /// The memory-mapped TWI block of the ATmega328P.
    pub struct Atmega328pTwi {
        _private: (),
    }

    impl Atmega328pTwi {
        /// # Safety
        ///
        /// Only one instance may exist, and nothing else may touch the TWI
        /// registers or PORTC4/PORTC5 while it is alive.
        pub const unsafe fn steal() -> Self {
            Self { _private: () }
        }
    }

    // SAFETY: the addresses are the fixed I/O locations of the TWI block and
    // PORTC on this part; single-byte volatile accesses are atomic on AVR.
    impl TwiRegisters for Atmega328pTwi {
        fn twcr(&self) -> u8 {
            unsafe { TWCR.read_volatile() }
        }
        fn set_twcr(&self, value: u8) {
            unsafe { TWCR.write_volatile(value) }
        }
        fn twsr(&self) -> u8 {
            unsafe { TWSR.read_volatile() }
        }
        fn set_twsr(&self, value: u8) {
            unsafe { TWSR.write_volatile(value) }
        }
        fn twdr(&self) -> u8 {
            unsafe { TWDR.read_volatile() }
        }
        fn set_twdr(&self, value: u8) {
            unsafe { TWDR.write_volatile(value) }
        }
        fn twbr(&self) -> u8 {
            unsafe { TWBR.read_volatile() }
        }
        fn set_twbr(&self, value: u8) {
            unsafe { TWBR.write_volatile(value) }
        }
        fn set_pullups(&self, enabled: bool) {
            critical_section::with(|_| unsafe {
                let port = PORTC.read_volatile();
                let port = if enabled {
                    port | SDA | SCL
                } else {
                    port & !(SDA | SCL)
                };
                PORTC.write_volatile(port);
            })
        }
    }
}
