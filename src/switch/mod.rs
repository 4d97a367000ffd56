pub mod controller;
pub mod expiry;
pub mod marker;
pub mod wemo;

use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

/// A connected switch. Turning it off when already off must succeed.
pub trait SwitchDevice {
    fn name(&self) -> &str;
    fn set_power(&self, power: Power) -> Result<(), DeviceError>;
}

/// Resolves the configured switch on the network.
pub trait SwitchDriver: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SwitchDevice>, DeviceError>;
}
