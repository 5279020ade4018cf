use embedded_hal::digital::OutputPin;

/// A boolean actuator: a relay, SSR or contactor.
pub trait Output {
    type Error: core::fmt::Debug;

    fn set(&mut self, on: bool) -> Result<(), Self::Error>;
}

/// Drives an output pin. `inverted` swaps the electrical levels: ON drives
/// the pin low.
pub struct PinOutput<P> {
    pin: P,
    inverted: bool,
}

impl<P: OutputPin> PinOutput<P> {
    pub fn new(pin: P, inverted: bool) -> Self {
        Self { pin, inverted }
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }
}

impl<P: OutputPin> Output for PinOutput<P> {
    type Error = P::Error;

    fn set(&mut self, on: bool) -> Result<(), Self::Error> {
        if on != self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}

/// Stand-in when no hardware is attached (simulated ovens).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Output for NullOutput {
    type Error = core::convert::Infallible;

    fn set(&mut self, _on: bool) -> Result<(), Self::Error> {
        Ok(())
    }
}
