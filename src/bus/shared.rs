use super::{wait_idle, BusTransport, DEFAULT_BUSY_POLLS};
use crate::error::BusError;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// A clonable handle to one physical bus.
///
/// Each clone can be handed to a different driver. The lock is held for a
/// whole transaction (ready poll included), never per byte, so transactions
/// from different handles cannot interleave.
#[derive(Debug)]
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
    max_busy_polls: u32,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_busy_polls: self.max_busy_polls,
        }
    }
}

impl<B: BusTransport> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
            max_busy_polls: DEFAULT_BUSY_POLLS,
        }
    }

    #[must_use]
    pub fn with_busy_polls(mut self, max_busy_polls: u32) -> Self {
        self.max_busy_polls = max_busy_polls;
        self
    }

    /// Run `f` with exclusive access to the bus once it reports idle.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut B) -> Result<R, BusError>,
    ) -> Result<R, BusError> {
        let mut bus = self.inner.lock().map_err(|_| BusError::Poisoned)?;
        wait_idle(&mut *bus, self.max_busy_polls)?;
        f(&mut *bus)
    }

    /// Borrow the underlying bus without a ready poll, e.g. to inspect a simulator.
    pub fn inspect<R>(&self, f: impl FnOnce(&B) -> R) -> Result<R, BusError> {
        let bus = self.inner.lock().map_err(|_| BusError::Poisoned)?;
        Ok(f(&*bus))
    }

    pub fn inspect_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, BusError> {
        let mut bus = self.inner.lock().map_err(|_| BusError::Poisoned)?;
        Ok(f(&mut *bus))
    }
}

impl<B: BusTransport> BusTransport for SharedBus<B> {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        trace!(address, register, len = data.len(), "bus write");
        self.transaction(|bus| bus.write(address, register, data))
    }

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        trace!(address, register, len = buf.len(), "bus read");
        self.transaction(|bus| bus.read(address, register, buf))
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        trace!(address, len = buf.len(), "bus receive");
        self.transaction(|bus| bus.receive(address, buf))
    }
}
