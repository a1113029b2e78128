use heapless::Vec;

/// Receive buffer of the Wire façade, consumed from a read cursor.
pub struct ReceiveBuffer<const BUFSIZE: usize> {
    buf: Vec<u8, BUFSIZE>,
    pos: usize,
}

impl<const BUFSIZE: usize> ReceiveBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Lends `quantity` bytes (clamped to capacity) to `read`, which returns
    /// how many it actually filled. Rewinds the cursor.
    pub fn fill(&mut self, quantity: usize, read: impl FnOnce(&mut [u8]) -> usize) -> usize {
        let quantity = quantity.min(BUFSIZE);
        self.buf.clear();
        // Cannot fail: quantity <= BUFSIZE.
        let _ = self.buf.resize(quantity, 0);

        let n = read(&mut self.buf).min(quantity);
        self.buf.truncate(n);
        self.pos = 0;
        n
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }
}

impl<const BUFSIZE: usize> Iterator for ReceiveBuffer<BUFSIZE> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }
}
