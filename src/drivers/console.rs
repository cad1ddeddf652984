//! Console Device
//!
//! Descriptor 0 reads from the console keyboard, descriptor 1 writes to the
//! console display. The device itself is provided by the embedding kernel.
//!
//! # Security Considerations
//! - Output of one `write` call is emitted under a single lock acquisition,
//!   so concurrent writers never interleave inside a buffer
//! - Input is read one byte at a time; the caller bounds the count

use alloc::boxed::Box;

use spin::Mutex;

/// A console device.
pub trait Console: Send {
    /// Block until one input byte is available and return it.
    fn getc(&mut self) -> u8;
    /// Write `buf` to the display.
    fn putbuf(&mut self, buf: &[u8]);
}

/// Console device shared by every process, protected by spinlock.
pub struct ConsoleLock {
    device: Mutex<Box<dyn Console>>,
}

impl ConsoleLock {
    pub fn new(device: Box<dyn Console>) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    /// Fill `buf` with keyboard input.
    pub fn read(&self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.device.lock().getc();
        }
    }

    /// Write `buf` to the display atomically.
    pub fn write(&self, buf: &[u8]) {
        self.device.lock().putbuf(buf);
    }
}
