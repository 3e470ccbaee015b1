use core::marker::PhantomData;

use embedded_hal::adc::{Channel, OneShot};
use micromath::F32Ext;

use crate::config::BatteryConfig;

/// Battery voltage measured through a voltage divider
///
/// Works with any blocking-capable one-shot ADC. Each reading starts a single
/// conversion and busy-waits until it finishes.
pub struct Battery<ADC, A, P> {
    adc: A,
    pin: P,
    config: &'static BatteryConfig,
    _adc: PhantomData<ADC>,
}

impl<ADC, A, P> Battery<ADC, A, P>
where
    A: OneShot<ADC, u16, P>,
    P: Channel<ADC>,
{
    pub fn new(adc: A, pin: P, config: &'static BatteryConfig) -> Self {
        Self { adc, pin, config, _adc: PhantomData }
    }

    /// Raw ADC conversion result
    pub fn read_bits(&mut self) -> Result<u16, A::Error> {
        nb::block!(self.adc.read(&mut self.pin))
    }

    /// Battery voltage in volts
    pub fn voltage(&mut self) -> Result<f32, A::Error> {
        let bits = self.read_bits()?;
        Ok(self.config.bits_to_volts(bits))
    }

    /// Voltage available to the motors, which are powered directly from the battery
    pub fn motors_voltage(&mut self) -> Result<f32, A::Error> {
        self.voltage()
    }

    /// Battery voltage in millivolts, rounded
    pub fn millivolts(&mut self) -> Result<u32, A::Error> {
        self.voltage().map(volts_to_millivolts)
    }

    pub fn free(self) -> (A, P) {
        (self.adc, self.pin)
    }
}

pub fn volts_to_millivolts(volts: f32) -> u32 {
    if volts <= 0.0 {
        0
    } else {
        (volts * 1000.0).round() as u32
    }
}
