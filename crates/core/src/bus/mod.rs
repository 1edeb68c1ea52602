//! Field-bus access: Modbus RTU coil writes over a byte transport.

pub mod frame;
pub mod serial;

use std::io::{self, Read, Write};

pub use frame::Request;
pub use serial::SerialConnector;

/// Failure of a single bus request.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus io error: {0}")]
    Io(io::Error),
    #[error("no reply before the response timeout")]
    Timeout,
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("crc mismatch: expected {expected:#06x}, got {actual:#06x}")]
    Crc { expected: u16, actual: u16 },
    #[error("device rejected function {function:#04x} with exception code {code:#04x}")]
    Exception { function: u8, code: u8 },
    #[error("unexpected reply: {0}")]
    UnexpectedResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("bus is not open")]
    Closed,
}

impl BusError {
    /// True when the device does not accept this call shape at all, so a
    /// different write convention may still succeed.
    pub fn is_call_shape_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Exception {
                code: frame::ILLEGAL_FUNCTION,
                ..
            }
        )
    }
}

impl From<io::Error> for BusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io(err),
        }
    }
}

/// Byte stream to the bus.
pub trait Transport: Read + Write {
    /// Drops bytes already received but not read, such as a reply that
    /// arrived after its request had timed out.
    fn discard_input(&mut self) -> Result<(), BusError>;
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn discard_input(&mut self) -> Result<(), BusError> {
        serialport::SerialPort::clear(&**self, serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

/// Opens the byte stream to the bus. Called once per run.
pub trait Connector {
    type Transport: Transport;

    fn connect(&mut self) -> Result<Self::Transport, BusError>;

    /// Human readable endpoint name used in logs and errors.
    fn endpoint(&self) -> String;
}

/// Request/reply exchange with one device on an open transport.
#[derive(Debug)]
pub struct ModbusClient<T> {
    transport: T,
    unit: u8,
}

impl<T: Transport> ModbusClient<T> {
    pub fn new(transport: T, unit: u8) -> Self {
        Self { transport, unit }
    }

    pub fn unit(&self) -> u8 {
        self.unit
    }

    pub fn write_coils(&mut self, address: u16, values: &[bool]) -> Result<(), BusError> {
        self.execute(Request::WriteMultipleCoils { address, values })
    }

    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<(), BusError> {
        self.execute(Request::WriteSingleCoil { address, value })
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn execute(&mut self, request: Request<'_>) -> Result<(), BusError> {
        let frame = request.encode(self.unit)?;
        // a late reply to an earlier request must not be read as ours
        self.transport.discard_input()?;
        self.transport.write_all(&frame)?;
        self.transport.flush()?;

        // broadcast writes are never acknowledged
        if self.unit == 0 {
            return Ok(());
        }

        let mut reply = vec![0u8; frame::EXCEPTION_LEN];
        self.transport.read_exact(&mut reply)?;
        if reply[1] & frame::EXCEPTION_FLAG == 0 {
            let mut rest = [0u8; frame::REPLY_LEN - frame::EXCEPTION_LEN];
            self.transport.read_exact(&mut rest)?;
            reply.extend_from_slice(&rest);
        }

        request.check_reply(self.unit, &reply)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDevice;
    use super::*;

    #[test]
    fn writes_coil_block() {
        let device = FakeDevice::new();
        let mut client = ModbusClient::new(device.clone(), 1);

        client.write_coils(4, &[true, false, true]).unwrap();

        assert!(device.coil(4));
        assert!(!device.coil(5));
        assert!(device.coil(6));
    }

    #[test]
    fn exception_reply_is_call_shape_mismatch() {
        let device = FakeDevice::legacy();
        let mut client = ModbusClient::new(device.clone(), 1);

        let err = client.write_coils(4, &[true]).unwrap_err();
        assert!(err.is_call_shape_mismatch());

        client.write_coil(4, true).unwrap();
        assert!(device.coil(4));
    }

    #[test]
    fn silent_device_times_out() {
        let mut client = ModbusClient::new(FakeDevice::silent(), 1);
        assert!(matches!(client.write_coil(4, true), Err(BusError::Timeout)));
    }

    #[test]
    fn late_reply_does_not_spill_into_next_request() {
        let device = FakeDevice::slow_first_reply();
        let mut client = ModbusClient::new(device.clone(), 1);

        assert!(matches!(client.write_coil(4, true), Err(BusError::Timeout)));
        client.write_coil(5, true).unwrap();
        client.write_coil(6, true).unwrap();
        client.write_coil(4, false).unwrap();

        assert!(!device.coil(4));
        assert!(device.coil(5) && device.coil(6));
    }

    #[test]
    fn broadcast_skips_reply() {
        let device = FakeDevice::silent();
        let mut client = ModbusClient::new(device.clone(), 0);

        client.write_coils(4, &[true]).unwrap();
        assert_eq!(device.state.borrow().requests.len(), 1);
    }

    #[test]
    fn timeout_is_not_a_call_shape_mismatch() {
        assert!(!BusError::Timeout.is_call_shape_mismatch());
        assert!(!BusError::Exception {
            function: frame::WRITE_MULTIPLE_COILS,
            code: 0x02
        }
        .is_call_shape_mismatch());
    }
}
