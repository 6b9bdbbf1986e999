//! Addressed transactions on the shared two-wire bus.
//!
//! Every device in the panel talks through [`BusTransport`]. A single call is
//! one complete transaction: it either finishes or fails before the next call
//! begins. [`SharedBus`] extends that guarantee to several owners of the same
//! bus, and [`HalBus`] adapts any `embedded-hal` I2C controller.

pub mod hal;
pub mod shared;

pub use hal::HalBus;
pub use shared::SharedBus;

use crate::error::BusError;

/// Ready-poll budget used when the configuration does not set one.
pub const DEFAULT_BUSY_POLLS: u32 = 1000;

pub trait BusTransport {
    /// Write `data` to `register` of the device at `address`.
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError>;

    /// Read `buf.len()` bytes starting at `register` of the device at `address`.
    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError>;

    /// Plain read with no register phase, for devices without a register file.
    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError>;

    /// Whether the bus can start a transaction now.
    fn poll_idle(&mut self) -> nb::Result<(), BusError> {
        Ok(())
    }
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        (**self).write(address, register, data)
    }

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(address, register, buf)
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).receive(address, buf)
    }

    fn poll_idle(&mut self) -> nb::Result<(), BusError> {
        (**self).poll_idle()
    }
}

/// Poll `bus` until it reports idle, giving up after `max_polls` attempts.
pub fn wait_idle<B: BusTransport + ?Sized>(bus: &mut B, max_polls: u32) -> Result<(), BusError> {
    for _ in 0..=max_polls {
        match bus.poll_idle() {
            Ok(()) => return Ok(()),
            Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
            Err(nb::Error::Other(e)) => return Err(e),
        }
    }
    Err(BusError::Busy)
}
