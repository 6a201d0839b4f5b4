use cnc_motion::Ring;
use core::cell::RefCell;
use cortex_m::{
    asm::wfi,
    interrupt::{free, Mutex},
};
use embedded_io::{ErrorType, Write, WriteReady};

/// Enough for a full `$$` report without blocking the main loop.
const SERIAL_BUFFER_SIZE: usize = 512;

/// Serial writer for which the transmit interrupt can be enabled and disabled.
pub trait Listenable {
    /// Enable the interrupt for when a byte may be written.
    fn listen(&mut self);

    /// Disable the interrupt for when a byte may be written.
    fn unlisten(&mut self);
}

/// The transmit side of the serial port. Bytes are queued in a ring and sent from the USART
/// interrupt, so writes only block when the ring is full.
pub struct BufferedSerialWriter<W: 'static + Write + WriteReady + Listenable> {
    state: &'static Mutex<RefCell<BufferState<W>>>,
}

impl<W: Write + WriteReady + Listenable> BufferedSerialWriter<W> {
    pub fn new(state: &'static Mutex<RefCell<BufferState<W>>>) -> Self {
        Self { state }
    }
}

impl<W: Write + WriteReady + Listenable> ErrorType for BufferedSerialWriter<W> {
    type Error = W::Error;
}

impl<W: Write + WriteReady + Listenable> Write for BufferedSerialWriter<W> {
    fn write(&mut self, buffer: &[u8]) -> Result<usize, Self::Error> {
        if buffer.is_empty() {
            return Ok(0);
        }

        loop {
            let written = free(|cs| {
                let state = &mut *self.state.borrow(cs).borrow_mut();
                let written = state.buffer.push_all(buffer);
                // The interrupt won't fire until something has been sent, so start it off here.
                state.try_write();
                written
            });

            if written > 0 {
                return Ok(written);
            }
            // Full, so wait for the interrupt handler to send something.
            wfi();
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        loop {
            let flushed = free(|cs| {
                let state = &mut *self.state.borrow(cs).borrow_mut();
                if !state.buffer.is_empty() {
                    None
                } else if let Some(writer) = &mut state.writer {
                    Some(writer.flush())
                } else {
                    Some(Ok(()))
                }
            });
            if let Some(result) = flushed {
                return result;
            }
            wfi();
        }
    }
}

/// The ring shared between [`BufferedSerialWriter`] and the USART interrupt.
pub struct BufferState<W> {
    buffer: Ring<u8, SERIAL_BUFFER_SIZE>,
    writer: Option<W>,
}

impl<W> BufferState<W> {
    pub const fn new() -> Self {
        Self {
            buffer: Ring::new(),
            writer: None,
        }
    }
}

impl<W: Write + WriteReady + Listenable> BufferState<W> {
    pub fn set_writer(&mut self, writer: W) {
        self.writer = Some(writer);
    }

    /// Send as many queued bytes as the USART will take right now, then listen for the transmit
    /// interrupt only if there are more to come.
    pub fn try_write(&mut self) {
        if let Some(writer) = &mut self.writer {
            while let Some(&byte) = self.buffer.peek() {
                if !matches!(writer.write_ready(), Ok(true))
                    || !matches!(writer.write(&[byte]), Ok(1))
                {
                    break;
                }
                self.buffer.pop();
            }

            if self.buffer.is_empty() {
                writer.unlisten();
            } else {
                writer.listen();
            }
        }
    }
}
