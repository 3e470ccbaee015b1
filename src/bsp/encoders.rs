use crate::hal;
use hal::pac::{TIM3, TIM4, tim3};

/// Quadrature encoders of both wheels
///
/// Left wheel is counted by TIM3, right wheel by TIM4. Counters are
/// free-running 16-bit values, use [`delta`] to get the signed difference
/// between two readings. Encoder pins must be configured by the caller
/// (TIM3: PB4/PB5, TIM4: PB6/PB7, both AF2).
pub struct Encoders {
    left: TIM3,
    right: TIM4,
}

impl Encoders {
    pub fn new(left: TIM3, right: TIM4) -> Self {
        // Need to access some registers outside of HAL type system
        let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };
        rcc_regs.apb1enr.modify(|_, w| w.tim3en().set_bit().tim4en().set_bit());

        Self::configure(&left);
        Self::configure(&right);

        Self { left, right }
    }

    fn configure(tim: &tim3::RegisterBlock) {
        tim.cr1.modify(|_, w| w.cen().clear_bit());
        tim.arr.write(|w| unsafe { w.bits(0xffff) });
        // Encoder mode 3, count on both TI1 and TI2 edges
        tim.smcr.modify(|_, w| unsafe { w.sms().bits(0b011) });
        // CC1/CC2 as inputs mapped to TI1/TI2
        tim.ccmr1_input().modify(|_, w| unsafe { w.cc1s().bits(0b01).cc2s().bits(0b01) });
        tim.ccer.modify(|_, w| {
            w
                .cc1p().clear_bit()
                .cc2p().clear_bit()
                .cc1e().set_bit()
                .cc2e().set_bit()
        });
        tim.cnt.write(|w| unsafe { w.bits(0) });
        tim.cr1.modify(|_, w| w.cen().set_bit());
    }

    pub fn left(&self) -> u16 {
        self.left.cnt.read().bits() as u16
    }

    pub fn right(&self) -> u16 {
        self.right.cnt.read().bits() as u16
    }

    /// Read both counters as (left, right)
    pub fn read(&self) -> (u16, u16) {
        (self.left(), self.right())
    }
}

/// Signed number of counts between two readings of a wrapping counter
///
/// Correct as long as the wheel moves less than half of the counter range
/// between the readings.
pub fn delta(prev: u16, now: u16) -> i16 {
    now.wrapping_sub(prev) as i16
}
