use heapless::Vec;

/// Transmit buffer of the Wire façade. Overflow is remembered, not reported.
pub struct SendBuffer<const BUFSIZE: usize> {
    buf: Vec<u8, BUFSIZE>,
    write_error: bool,
}

impl<const BUFSIZE: usize> SendBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            write_error: false,
        }
    }

    /// Appends `byte`; returns `false` and sets the write error if full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.buf.push(byte).is_err() {
            self.write_error = true;
            return false;
        }
        true
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn write_error(&self) -> bool {
        self.write_error
    }

    pub fn clear_write_error(&mut self) {
        self.write_error = false;
    }
}
