//! Core library for the Lamp Show application.
//!
//! Fires lamp pulses on a Modbus RTU output bank in step with a media
//! clock. A [`Timeline`] of scheduled actions is played by the
//! [`Dispatcher`], which polls a [`ClockSource`] and drives an
//! [`Actuator`] through the pulse shapes held in a [`PatternLibrary`].

pub mod actuator;
pub mod bus;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pattern;
pub mod show;
pub mod timeline;

pub use actuator::{Actuator, CallConvention, DryRunActuator, ModbusActuator};
pub use bus::{BusError, Connector, SerialConnector};
pub use clock::{ClockReading, ClockSource, ManualClock, ScriptedClock, StopHandle, WallClock};
pub use config::{AppConfig, BusConfig, RunConfig};
pub use dispatcher::{Dispatcher, RunReport, Termination};
pub use error::{LampShowError, Result};
pub use pattern::{OutputCommand, PatternLibrary, PatternSpec};
pub use show::Schedule;
pub use timeline::{ActionId, ScheduledEvent, Timeline, TimelineBuilder};
