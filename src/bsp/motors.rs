use embedded_hal::PwmPin;
use micromath::F32Ext;

/// PWM drive of both wheel motors
///
/// Duty is given as a ratio in `[0, 1]`, values outside are clamped.
pub struct MotorPwm<L, R> {
    left: L,
    right: R,
}

impl<L, R> MotorPwm<L, R>
where
    L: PwmPin<Duty = u16>,
    R: PwmPin<Duty = u16>,
{
    /// Enable both PWM outputs with the motors stopped
    pub fn new(mut left: L, mut right: R) -> Self {
        left.set_duty(0);
        right.set_duty(0);
        left.enable();
        right.enable();
        Self { left, right }
    }

    fn duty(ratio: f32, max: u16) -> u16 {
        // NaN ends up as 0
        let ratio = if ratio > 1.0 {
            1.0
        } else if ratio > 0.0 {
            ratio
        } else {
            0.0
        };
        (ratio * max as f32).round() as u16
    }

    pub fn set_left(&mut self, ratio: f32) {
        let duty = Self::duty(ratio, self.left.get_max_duty());
        self.left.set_duty(duty);
    }

    pub fn set_right(&mut self, ratio: f32) {
        let duty = Self::duty(ratio, self.right.get_max_duty());
        self.right.set_duty(duty);
    }

    pub fn set(&mut self, left: f32, right: f32) {
        self.set_left(left);
        self.set_right(right);
    }

    pub fn stop(&mut self) {
        self.left.set_duty(0);
        self.right.set_duty(0);
    }

    /// Current (left, right) duty cycle
    pub fn duty_cycle(&self) -> (u16, u16) {
        (self.left.get_duty(), self.right.get_duty())
    }

    pub fn free(mut self) -> (L, R) {
        self.stop();
        self.left.disable();
        self.right.disable();
        (self.left, self.right)
    }
}
