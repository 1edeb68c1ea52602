//! Output bank access used by the dispatcher.
//!
//! [`Actuator::send`] never fails loudly: a write that did not complete is
//! logged and reported as `false`, and the caller moves on. Only
//! [`Actuator::open`] returns an error, since a run cannot start without the
//! bus.

use serde::{Deserialize, Serialize};

use crate::{
    bus::{BusError, Connector, ModbusClient},
    clock::Pause,
    pattern::OutputCommand,
    LampShowError, Result,
};

pub trait Actuator {
    /// Establishes the connection. Must succeed before a run starts.
    fn open(&mut self) -> Result<()>;

    /// Writes `bit_pattern` to consecutive outputs starting at `base_address`.
    fn send(&mut self, base_address: u16, bit_pattern: &[bool]) -> bool;

    /// Releases the connection. Safe to call when not open.
    fn close(&mut self);
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn send(&mut self, base_address: u16, bit_pattern: &[bool]) -> bool {
        (**self).send(base_address, bit_pattern)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Fires the fixed on/hold/off pulse for every command, in order.
///
/// The off write is issued even when the on write failed. Returns `true`
/// only if every write succeeded.
pub fn pulse<A, P>(actuator: &mut A, commands: &[OutputCommand], pause: &mut P) -> bool
where
    A: Actuator + ?Sized,
    P: Pause + ?Sized,
{
    let mut ok = true;
    for command in commands {
        let on = actuator.send(command.base_address, &command.bit_pattern);
        pause.pause(command.hold());
        let off = actuator.send(command.base_address, &command.off_pattern());
        ok &= on && off;
    }
    ok
}

/// Open connection that closes itself when dropped, on every exit path.
pub struct Session<'a, A: Actuator + ?Sized> {
    actuator: &'a mut A,
}

impl<'a, A: Actuator + ?Sized> Session<'a, A> {
    pub fn open(actuator: &'a mut A) -> Result<Self> {
        actuator.open()?;
        Ok(Self { actuator })
    }

    pub fn actuator(&mut self) -> &mut A {
        &mut *self.actuator
    }
}

impl<A: Actuator + ?Sized> Drop for Session<'_, A> {
    fn drop(&mut self) {
        self.actuator.close();
    }
}

/// Shape of the coil write issued to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallConvention {
    /// One write-multiple-coils request for the whole pattern.
    MultipleCoils,
    /// One write-single-coil request per bit, for devices without FC 0x0F.
    SingleCoils,
}

/// Modbus RTU adapter.
///
/// Conventions are tried in the configured order, once each per `send`. The
/// next one is only attempted when the device rejects the call shape itself;
/// timeouts and corrupted replies fail the send straight away.
pub struct ModbusActuator<C: Connector> {
    connector: C,
    unit: u8,
    conventions: Vec<CallConvention>,
    client: Option<ModbusClient<C::Transport>>,
}

impl<C: Connector> ModbusActuator<C> {
    pub fn new(connector: C, unit: u8, conventions: Vec<CallConvention>) -> Self {
        Self {
            connector,
            unit,
            conventions,
            client: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn write(
        client: &mut ModbusClient<C::Transport>,
        convention: CallConvention,
        base_address: u16,
        bit_pattern: &[bool],
    ) -> std::result::Result<(), BusError> {
        match convention {
            CallConvention::MultipleCoils => client.write_coils(base_address, bit_pattern),
            CallConvention::SingleCoils => {
                for (offset, value) in bit_pattern.iter().enumerate() {
                    let address = base_address
                        .checked_add(offset as u16)
                        .ok_or_else(|| BusError::InvalidRequest("coil address overflow".into()))?;
                    client.write_coil(address, *value)?;
                }
                Ok(())
            }
        }
    }
}

impl<C: Connector> Actuator for ModbusActuator<C> {
    fn open(&mut self) -> Result<()> {
        let endpoint = self.connector.endpoint();
        let transport = self
            .connector
            .connect()
            .map_err(|source| LampShowError::Connect {
                port: endpoint.clone(),
                source,
            })?;
        self.client = Some(ModbusClient::new(transport, self.unit));
        tracing::info!(%endpoint, "bus connected");
        Ok(())
    }

    fn send(&mut self, base_address: u16, bit_pattern: &[bool]) -> bool {
        let Some(client) = self.client.as_mut() else {
            tracing::warn!(base_address, err = %BusError::Closed, "coil write failed");
            return false;
        };
        if bit_pattern.is_empty() {
            tracing::warn!(base_address, "refusing to write an empty pattern");
            return false;
        }

        let mut last_error = None;
        for convention in &self.conventions {
            match Self::write(client, *convention, base_address, bit_pattern) {
                Ok(()) => return true,
                Err(err) if err.is_call_shape_mismatch() => {
                    tracing::debug!(?convention, %err, "device rejected call shape, falling back");
                    last_error = Some(err);
                }
                Err(err) => {
                    tracing::warn!(?convention, base_address, %err, "coil write failed");
                    return false;
                }
            }
        }

        match last_error {
            Some(err) => {
                tracing::warn!(base_address, %err, "coil write failed with every call convention")
            }
            None => tracing::warn!(base_address, "no call conventions configured"),
        }
        false
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            tracing::info!(endpoint = %self.connector.endpoint(), "bus closed");
        }
    }
}

/// Logs writes instead of touching hardware.
#[derive(Debug, Default)]
pub struct DryRunActuator {
    open: bool,
    writes: usize,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Actuator for DryRunActuator {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        tracing::info!("dry run: no bus connection");
        Ok(())
    }

    fn send(&mut self, base_address: u16, bit_pattern: &[bool]) -> bool {
        if !self.open {
            return false;
        }
        self.writes += 1;
        tracing::info!(base_address, ?bit_pattern, "dry run write");
        true
    }

    fn close(&mut self) {
        self.open = false;
    }
}
