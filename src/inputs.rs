use embedded_hal::digital::InputPin;
use log::warn;

use crate::DoorState;

pub trait DoorSensor {
    fn read(&mut self) -> DoorState;
}

/// Door switch on a pulled-up input: high while the door is open.
pub struct PinDoorSensor<P> {
    pin: P,
}

impl<P: InputPin> PinDoorSensor<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: InputPin> DoorSensor for PinDoorSensor<P> {
    fn read(&mut self) -> DoorState {
        match self.pin.is_high() {
            Ok(true) => DoorState::Open,
            Ok(false) => DoorState::Closed,
            Err(e) => {
                warn!("Door switch read failed: {:?}", e);
                DoorState::Unknown
            }
        }
    }
}

/// No door switch fitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDoorSensor;

impl DoorSensor for NoDoorSensor {
    fn read(&mut self) -> DoorState {
        DoorState::Unknown
    }
}
