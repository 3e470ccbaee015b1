use crate::hal;
use hal::pac::TIM11;

/// PWM buzzer on TIM11 channel 1
///
/// The timer counter runs at a fixed base frequency, the tone is selected by
/// changing the auto-reload value. Output pin (PB9 in AF3) must be configured
/// by the caller.
pub struct Speaker {
    tim: TIM11,
    base_frequency_hz: u32,
}

impl Speaker {
    /// Configure TIM11, `timer_clk_hz` is the APB2 timer clock
    pub fn new(tim: TIM11, timer_clk_hz: u32, base_frequency_hz: u32) -> Self {
        // Need to access some registers outside of HAL type system
        let rcc_regs = unsafe { &*hal::pac::RCC::ptr() };
        rcc_regs.apb2enr.modify(|_, w| w.tim11en().set_bit());

        let psc = (timer_clk_hz / base_frequency_hz).saturating_sub(1);
        tim.cr1.modify(|_, w| w.cen().clear_bit().arpe().set_bit());
        tim.psc.write(|w| unsafe { w.bits(psc) });
        // PWM mode 1 with preload
        tim.ccmr1_output().modify(|_, w| unsafe { w.oc1m().bits(0b110).oc1pe().set_bit() });
        tim.ccer.modify(|_, w| w.cc1e().clear_bit());
        // Load prescaler
        tim.egr.write(|w| w.ug().set_bit());

        Self { tim, base_frequency_hz }
    }

    /// Play a tone, frequencies that cannot be generated turn the speaker off
    pub fn on(&mut self, hz: f32) {
        let period = match speaker_period(self.base_frequency_hz, hz) {
            Some(period) => period,
            None => {
                defmt::warn!("Speaker frequency out of range");
                self.off();
                return;
            },
        };
        self.tim.arr.write(|w| unsafe { w.bits(period as u32) });
        self.tim.ccr1().write(|w| unsafe { w.bits(period as u32 / 2) });
        self.tim.cr1.modify(|_, w| w.cen().set_bit());
        self.tim.ccer.modify(|_, w| w.cc1e().set_bit());
    }

    pub fn off(&mut self) {
        self.tim.cr1.modify(|_, w| w.cen().clear_bit());
        self.tim.ccer.modify(|_, w| w.cc1e().clear_bit());
    }

    pub fn free(mut self) -> TIM11 {
        self.off();
        self.tim
    }
}

/// Timer period in base frequency counts for a tone of `hz`, truncated
pub fn speaker_period(base_frequency_hz: u32, hz: f32) -> Option<u16> {
    if hz.is_nan() || hz <= 0.0 {
        return None;
    }
    let period = base_frequency_hz as f32 / hz;
    if period < 2.0 || period >= u16::MAX as f32 + 1.0 {
        None
    } else {
        Some(period as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period() {
        assert_eq!(speaker_period(1_000_000, 1000.0), Some(1000));
        assert_eq!(speaker_period(1_000_000, 440.0), Some(2272));
        assert_eq!(speaker_period(1_000_000, 3000.0), Some(333));
        // Fractional periods are truncated, 1e6 / 1500 = 666.67
        assert_eq!(speaker_period(1_000_000, 1500.0), Some(666));
        assert_eq!(speaker_period(1_000_000, 15.26), Some(65530));
    }

    #[test]
    fn period_out_of_range() {
        assert_eq!(speaker_period(1_000_000, 0.0), None);
        assert_eq!(speaker_period(1_000_000, -5.0), None);
        assert_eq!(speaker_period(1_000_000, f32::NAN), None);
        // Too low, would overflow the 16-bit timer
        assert_eq!(speaker_period(1_000_000, 10.0), None);
        // Too high
        assert_eq!(speaker_period(1_000_000, 800_000.0), None);
        assert_eq!(speaker_period(1_000_000, 16.0), Some(62500));
    }
}
