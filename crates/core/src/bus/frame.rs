//! Modbus RTU frames for the two coil-write functions the lamp rig uses.
//!
//! ```text
//! write single coil      unit | 0x05 | addr(2) | 0xFF00/0x0000        | crc(2)
//! write multiple coils   unit | 0x0F | addr(2) | qty(2) | n | bytes.. | crc(2)
//! normal reply           unit | fc   | addr(2) | value/qty(2)         | crc(2)
//! exception reply        unit | fc|0x80 | code                        | crc(2)
//! ```
//!
//! Multi-byte fields are big-endian except the CRC, which is sent low byte
//! first.

use super::BusError;

pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Exception code a device returns for a function it does not implement.
pub const ILLEGAL_FUNCTION: u8 = 0x01;

/// Upper bound on coils per write-multiple request.
pub const MAX_COILS: usize = 0x07B0;

/// Length of a normal reply to either coil write.
pub const REPLY_LEN: usize = 8;
/// Length of an exception reply; also the prefix read before deciding which
/// kind of reply is arriving.
pub const EXCEPTION_LEN: usize = 5;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// Modbus CRC-16 (reflected polynomial 0xA001, initial value 0xFFFF).
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in bytes {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Packs coil states eight per byte, first coil in the least significant bit.
pub fn pack_coils(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (index, value) in values.iter().enumerate() {
        if *value {
            packed[index / 8] |= 1 << (index % 8);
        }
    }
    packed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    WriteSingleCoil { address: u16, value: bool },
    WriteMultipleCoils { address: u16, values: &'a [bool] },
}

impl Request<'_> {
    pub fn function(&self) -> u8 {
        match self {
            Self::WriteSingleCoil { .. } => WRITE_SINGLE_COIL,
            Self::WriteMultipleCoils { .. } => WRITE_MULTIPLE_COILS,
        }
    }

    fn address(&self) -> u16 {
        match self {
            Self::WriteSingleCoil { address, .. } | Self::WriteMultipleCoils { address, .. } => {
                *address
            }
        }
    }

    /// The two bytes after the address that a normal reply echoes back.
    fn echo_word(&self) -> u16 {
        match self {
            Self::WriteSingleCoil { value: true, .. } => COIL_ON,
            Self::WriteSingleCoil { value: false, .. } => COIL_OFF,
            Self::WriteMultipleCoils { values, .. } => values.len() as u16,
        }
    }

    /// Serialises the request addressed to `unit`, CRC included.
    pub fn encode(&self, unit: u8) -> Result<Vec<u8>, BusError> {
        let mut frame = Vec::with_capacity(16);
        frame.push(unit);
        frame.push(self.function());
        frame.extend_from_slice(&self.address().to_be_bytes());

        if let Self::WriteMultipleCoils { values, .. } = self {
            if values.is_empty() || values.len() > MAX_COILS {
                return Err(BusError::InvalidRequest(format!(
                    "coil count {} outside 1..={MAX_COILS}",
                    values.len()
                )));
            }
            let packed = pack_coils(values);
            frame.extend_from_slice(&self.echo_word().to_be_bytes());
            frame.push(packed.len() as u8);
            frame.extend_from_slice(&packed);
        } else {
            frame.extend_from_slice(&self.echo_word().to_be_bytes());
        }

        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Validates a complete reply frame from `unit` against this request.
    pub fn check_reply(&self, unit: u8, reply: &[u8]) -> Result<(), BusError> {
        if reply.len() < EXCEPTION_LEN {
            return Err(BusError::UnexpectedResponse(format!(
                "reply of {} bytes is too short",
                reply.len()
            )));
        }

        let (body, tail) = reply.split_at(reply.len() - 2);
        let expected = crc16(body);
        let actual = u16::from_le_bytes([tail[0], tail[1]]);
        if expected != actual {
            return Err(BusError::Crc { expected, actual });
        }

        if body[0] != unit {
            return Err(BusError::UnexpectedResponse(format!(
                "reply from unit {} while talking to unit {unit}",
                body[0]
            )));
        }

        let function = self.function();
        if body[1] == function | EXCEPTION_FLAG {
            return Err(BusError::Exception {
                function,
                code: body[2],
            });
        }
        if body[1] != function {
            return Err(BusError::UnexpectedResponse(format!(
                "reply for function {:#04x}, expected {function:#04x}",
                body[1]
            )));
        }

        if reply.len() != REPLY_LEN {
            return Err(BusError::UnexpectedResponse(format!(
                "reply of {} bytes, expected {REPLY_LEN}",
                reply.len()
            )));
        }

        let address = u16::from_be_bytes([body[2], body[3]]);
        let word = u16::from_be_bytes([body[4], body[5]]);
        if address != self.address() || word != self.echo_word() {
            return Err(BusError::UnexpectedResponse(format!(
                "echo {address:#06x}/{word:#06x} does not match request"
            )));
        }

        Ok(())
    }
}
