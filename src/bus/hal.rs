use super::BusTransport;
use crate::error::BusError;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, Operation};

/// Adapts a blocking `embedded-hal` I2C controller to [`BusTransport`].
#[derive(Debug)]
pub struct HalBus<I> {
    i2c: I,
}

impl<I: I2c> HalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

fn map_error(address: u8, kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusError::NoAcknowledge { address },
        ErrorKind::ArbitrationLoss => BusError::ArbitrationLost,
        ErrorKind::Overrun => BusError::Timeout { address },
        _ => BusError::Fault,
    }
}

impl<I: I2c> BusTransport for HalBus<I> {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        // Adjacent writes go out back to back without a repeated start.
        self.i2c
            .transaction(address, &mut [Operation::Write(&[register]), Operation::Write(data)])
            .map_err(|e| map_error(address, e.kind()))
    }

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .write_read(address, &[register], buf)
            .map_err(|e| map_error(address, e.kind()))
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .read(address, buf)
            .map_err(|e| map_error(address, e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource};

    #[derive(Default)]
    struct ScriptedI2c {
        written: Vec<(u8, Vec<u8>)>,
        reply: Vec<u8>,
        fail_with: Option<ErrorKind>,
    }

    impl ErrorType for ScriptedI2c {
        type Error = ErrorKind;
    }

    impl I2c for ScriptedI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if let Some(kind) = self.fail_with {
                return Err(kind);
            }
            let mut frame = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => frame.extend_from_slice(bytes),
                    Operation::Read(buf) => {
                        let n = buf.len().min(self.reply.len());
                        buf[..n].copy_from_slice(&self.reply[..n]);
                    }
                }
            }
            self.written.push((address, frame));
            Ok(())
        }
    }

    #[test]
    fn test_write_prefixes_register() {
        let mut bus = HalBus::new(ScriptedI2c::default());
        bus.write(0x3C, 0x40, &[1, 2, 3]).unwrap();

        let i2c = bus.release();
        assert_eq!(i2c.written, vec![(0x3C, vec![0x40, 1, 2, 3])]);
    }

    #[test]
    fn test_read_fills_buffer() {
        let mut bus = HalBus::new(ScriptedI2c {
            reply: vec![0xAA, 0xBB],
            ..Default::default()
        });
        let mut buf = [0u8; 2];
        bus.read(0x1E, 0x0A, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);
    }

    #[test]
    fn test_nack_maps_to_bus_error() {
        let mut bus = HalBus::new(ScriptedI2c {
            fail_with: Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            ..Default::default()
        });
        assert_eq!(
            bus.write(0x20, 0xFF, &[]),
            Err(BusError::NoAcknowledge { address: 0x20 })
        );

        let mut bus = HalBus::new(ScriptedI2c {
            fail_with: Some(ErrorKind::ArbitrationLoss),
            ..Default::default()
        });
        let mut buf = [0u8; 1];
        assert_eq!(bus.receive(0x20, &mut buf), Err(BusError::ArbitrationLost));
    }
}
