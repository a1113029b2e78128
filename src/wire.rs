//! Buffered, Arduino `Wire`-style interface over [`BusController`].

use crate::{
    bridge::SyncBridge, controller::BusController, receive_buffer::ReceiveBuffer,
    registers::TwiRegisters, send_buffer::SendBuffer, Completion, Pullups, Reason, Speed,
    I2C_READ, I2C_WRITE,
};

/// Default capacity of each buffer.
pub const BUFFER_LENGTH: usize = 32;

pub struct Wire<'d, R: TwiRegisters, B: SyncBridge, const BUFSIZE: usize = BUFFER_LENGTH> {
    bus: &'d BusController<R, B>,

    tx_address: u8,
    transmitting: bool,
    send_buffer: SendBuffer<BUFSIZE>,

    receive_buffer: ReceiveBuffer<BUFSIZE>,
}

impl<'d, R: TwiRegisters, B: SyncBridge, const BUFSIZE: usize> Wire<'d, R, B, BUFSIZE> {
    pub const fn new(bus: &'d BusController<R, B>) -> Self {
        Self {
            bus,
            tx_address: 0,
            transmitting: false,
            send_buffer: SendBuffer::new(),
            receive_buffer: ReceiveBuffer::new(),
        }
    }

    /// Clears both buffers and sets the bus to 100 kHz with internal pull-ups.
    pub fn begin(&mut self) {
        self.send_buffer.reset();
        self.receive_buffer.reset();
        self.bus.begin(Speed::Standard, Pullups::Internal);
    }

    pub fn begin_transmission(&mut self, address: u8) {
        self.transmitting = true;
        self.tx_address = address;
        self.send_buffer.reset();
    }

    /// Queues one byte. Returns 0 when the buffer is full or no
    /// transmission has been started.
    pub fn write(&mut self, data: u8) -> usize {
        if !self.transmitting {
            return 0;
        }
        usize::from(self.send_buffer.push(data))
    }

    /// Queues `data`, returning how many bytes fit.
    pub fn write_bytes(&mut self, data: &[u8]) -> usize {
        data.iter().map(|&b| self.write(b)).sum()
    }

    /// Sends the queued bytes.
    ///
    /// Returns 0 on success, 2 if the address was not acknowledged, 3 if a
    /// data byte was not acknowledged, 4 on any other failure. With
    /// `send_stop == false` the bus is kept with a repeated START.
    pub fn end_transmission(&mut self, send_stop: bool) -> u8 {
        let len = self.send_buffer.len();
        let result = self.bus.transfer(
            self.tx_address << 1 | I2C_WRITE,
            self.send_buffer.as_mut_slice(),
            len,
            completion(send_stop),
        );

        let ret = match result {
            Ok(()) => 0,
            Err(e) => {
                debug!("wire: write to {:#x} failed: {:?}", self.tx_address, e.reason);
                match e.reason {
                    Reason::AddressNack => 2,
                    Reason::DataNack => 3,
                    _ => 4,
                }
            }
        };

        self.send_buffer.reset();
        self.transmitting = false;
        ret
    }

    pub fn end_transmission_stop(&mut self) -> u8 {
        self.end_transmission(true)
    }

    /// Reads up to `quantity` bytes (clamped to the buffer size) from
    /// `address`. Returns the number of bytes actually received.
    pub fn request_from(&mut self, address: u8, quantity: usize, send_stop: bool) -> usize {
        let bus = self.bus;
        self.receive_buffer.fill(quantity, |buf| {
            let len = buf.len();
            if let Err(e) = bus.transfer(address << 1 | I2C_READ, buf, len, completion(send_stop)) {
                debug!("wire: read from {:#x} failed: {:?}", address, e.reason);
            }
            bus.bytes_transferred()
        })
    }

    pub fn request_from_stop(&mut self, address: u8, quantity: usize) -> usize {
        self.request_from(address, quantity, true)
    }

    pub fn available(&self) -> usize {
        self.receive_buffer.available()
    }

    /// Next received byte, or -1 once the buffer is exhausted.
    pub fn read(&mut self) -> i32 {
        self.receive_buffer.next().map_or(-1, i32::from)
    }

    /// Like [`read`](Self::read) without consuming the byte.
    pub fn peek(&self) -> i32 {
        self.receive_buffer.peek().map_or(-1, i32::from)
    }

    pub fn write_error(&self) -> bool {
        self.send_buffer.write_error()
    }

    pub fn clear_write_error(&mut self) {
        self.send_buffer.clear_write_error()
    }

    pub fn bus(&self) -> &'d BusController<R, B> {
        self.bus
    }
}

fn completion(send_stop: bool) -> Completion {
    if send_stop {
        Completion::Stop
    } else {
        Completion::RepeatedStart
    }
}
