use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;

use crate::utils::InfallibleResult;

pub const NLEDS: usize = 4;

/// Board status LEDs
pub struct Leds<P> {
    pins: [P; NLEDS],
    state: u8,
}

impl<P> Leds<P>
where
    P: OutputPin<Error = Infallible>,
{
    /// Take the LED pins, all LEDs start turned off
    pub fn new(pins: [P; NLEDS]) -> Self {
        let mut leds = Self { pins, state: 0 };
        leds.set_mask(0);
        leds
    }

    pub fn set(&mut self, i: usize, on: bool) {
        if i >= NLEDS {
            return;
        }
        if on {
            self.pins[i].set_high().infallible();
            self.state |= 1 << i;
        } else {
            self.pins[i].set_low().infallible();
            self.state &= !(1 << i);
        }
    }

    pub fn toggle(&mut self, i: usize) {
        let on = self.is_on(i);
        self.set(i, !on);
    }

    /// Set all LEDs at once, bit `i` controls LED `i`
    pub fn set_mask(&mut self, mask: u8) {
        for i in 0..NLEDS {
            self.set(i, mask & (1 << i) != 0);
        }
    }

    pub fn is_on(&self, i: usize) -> bool {
        i < NLEDS && self.state & (1 << i) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{rc::Rc, cell::Cell};

    #[derive(Clone)]
    struct MockPin(Rc<Cell<bool>>);

    impl OutputPin for MockPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    fn leds() -> (Leds<MockPin>, [Rc<Cell<bool>>; NLEDS]) {
        let levels: [Rc<Cell<bool>>; NLEDS] = core::array::from_fn(|_| Rc::new(Cell::new(true)));
        let pins = core::array::from_fn(|i| MockPin(levels[i].clone()));
        (Leds::new(pins), levels)
    }

    fn read(levels: &[Rc<Cell<bool>>; NLEDS]) -> [bool; NLEDS] {
        core::array::from_fn(|i| levels[i].get())
    }

    #[test]
    fn start_off() {
        let (leds, levels) = leds();
        assert_eq!(read(&levels), [false; NLEDS]);
        assert!(!leds.is_on(0));
    }

    #[test]
    fn set_and_toggle() {
        let (mut leds, levels) = leds();
        leds.set(1, true);
        leds.toggle(3);
        assert_eq!(read(&levels), [false, true, false, true]);
        leds.toggle(3);
        assert_eq!(read(&levels), [false, true, false, false]);
        assert!(leds.is_on(1));
        // Out of range is ignored
        leds.set(7, true);
        assert!(!leds.is_on(7));
    }

    #[test]
    fn mask() {
        let (mut leds, levels) = leds();
        leds.set_mask(0b1001);
        assert_eq!(read(&levels), [true, false, false, true]);
        leds.set_mask(0);
        assert_eq!(read(&levels), [false; NLEDS]);
    }
}
