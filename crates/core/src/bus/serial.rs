use serialport::{DataBits, SerialPort, StopBits};

use super::{BusError, Connector};
use crate::config::{BusConfig, Parity};

/// Opens the RS-485 adapter described by a [`BusConfig`].
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: BusConfig,
}

impl SerialConnector {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

impl Connector for SerialConnector {
    type Transport = Box<dyn SerialPort>;

    fn connect(&mut self) -> Result<Self::Transport, BusError> {
        let config = &self.config;
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits)?)
            .timeout(config.timeout())
            .open()?;
        Ok(port)
    }

    fn endpoint(&self) -> String {
        format!(
            "{} @ {} baud, unit {}",
            self.config.port, self.config.baud_rate, self.config.unit_id
        )
    }
}

fn data_bits(bits: u8) -> Result<DataBits, BusError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(BusError::InvalidRequest(format!(
            "unsupported data bits: {other}"
        ))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits, BusError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(BusError::InvalidRequest(format!(
            "unsupported stop bits: {other}"
        ))),
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_frame_settings() {
        assert_eq!(data_bits(8).unwrap(), DataBits::Eight);
        assert_eq!(stop_bits(2).unwrap(), StopBits::Two);
        assert_eq!(parity(Parity::Odd), serialport::Parity::Odd);
        assert!(data_bits(9).is_err());
        assert!(stop_bits(0).is_err());
    }

    #[test]
    fn missing_port_fails_to_connect() {
        let mut connector = SerialConnector::new(BusConfig {
            port: "/dev/lamp-show-does-not-exist".to_string(),
            ..BusConfig::default()
        });

        assert!(connector.connect().is_err());
        assert!(connector.endpoint().contains("9600 baud"));
    }
}
