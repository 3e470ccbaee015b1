//! Board support package
//!
//! Code that builds on top of MCU-specific HAL (hal and hal_ext) to implement
//! support for the board and the peripherals located on it.

pub mod battery;
pub mod clock;
pub mod encoders;
pub mod leds;
pub mod motors;
pub mod mpu;
pub mod speaker;

/// Read the cycle counter, it increases by one on each SYSCLK cycle
///
/// The counter has to be enabled first with [`enable_cycle_counter`].
pub fn read_cycle_counter() -> u32 {
    cortex_m::peripheral::DWT::cycle_count()
}

pub fn enable_cycle_counter(dcb: &mut cortex_m::peripheral::DCB, dwt: &mut cortex_m::peripheral::DWT) {
    dcb.enable_trace();
    dwt.enable_cycle_counter();
}
