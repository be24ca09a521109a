//! Four-channel DC motor driver.
//!
//! Each channel is an H-bridge with two direction lines (IN1/IN2) and a PWM enable line. Speeds
//! are signed bytes: the sign picks the direction, the magnitude the duty cycle out of 255.
//! Zero releases both direction lines, so the motor coasts rather than brakes.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use crate::utils::{config::MOTOR_COUNT, error::DeviceError};

/// Largest speed magnitude; maps to a fully-on enable line.
pub const MAX_SPEED: i16 = 255;

/// Clamp an arbitrary commanded speed into `-255..=255`.
#[inline]
pub fn clamp_speed(speed: i32) -> i16 {
    speed.clamp(-i32::from(MAX_SPEED), i32::from(MAX_SPEED)) as i16
}

/// One H-bridge channel.
pub struct MotorChannel<D, P> {
    in1: D,
    in2: D,
    enable: P,
    speed: i16,
}

impl<D, P> MotorChannel<D, P>
where
    D: OutputPin,
    P: SetDutyCycle,
{
    pub fn new(
        in1: D,
        in2: D,
        enable: P,
    ) -> Self {
        Self {
            in1,
            in2,
            enable,
            speed: 0,
        }
    }

    /// Last speed applied to the hardware (already clamped).
    #[inline]
    pub fn speed(&self) -> i16 {
        self.speed
    }

    pub fn set_speed(
        &mut self,
        speed: i32,
    ) -> Result<(), DeviceError> {
        let speed = clamp_speed(speed);

        match speed {
            s if s > 0 => {
                self.in2.set_low().map_err(DeviceError::pin)?;
                self.in1.set_high().map_err(DeviceError::pin)?;
            }
            s if s < 0 => {
                self.in1.set_low().map_err(DeviceError::pin)?;
                self.in2.set_high().map_err(DeviceError::pin)?;
            }
            _ => {
                self.in1.set_low().map_err(DeviceError::pin)?;
                self.in2.set_low().map_err(DeviceError::pin)?;
            }
        }

        if speed == 0 {
            self.enable
                .set_duty_cycle_fully_off()
                .map_err(DeviceError::pwm)?;
        } else {
            self.enable
                .set_duty_cycle_fraction(speed.unsigned_abs(), MAX_SPEED as u16)
                .map_err(DeviceError::pwm)?;
        }

        self.speed = speed;
        Ok(())
    }

    pub fn free(self) -> (D, D, P) {
        (self.in1, self.in2, self.enable)
    }
}

/// All four drive channels, addressed by index `0..4`.
pub struct MotorDriver<D, P> {
    channels: [MotorChannel<D, P>; MOTOR_COUNT],
}

impl<D, P> MotorDriver<D, P>
where
    D: OutputPin,
    P: SetDutyCycle,
{
    pub fn new(channels: [MotorChannel<D, P>; MOTOR_COUNT]) -> Self {
        Self { channels }
    }

    /// Drive one channel. Indices outside `0..4` are ignored.
    pub fn set_speed(
        &mut self,
        channel: usize,
        speed: i32,
    ) -> Result<(), DeviceError> {
        match self.channels.get_mut(channel) {
            Some(ch) => ch.set_speed(speed),
            None => {
                tracing::debug!(channel, "ignoring speed for unknown motor channel");
                Ok(())
            }
        }
    }

    /// Apply four speeds in channel order.
    pub fn set_all(
        &mut self,
        speeds: [i16; MOTOR_COUNT],
    ) -> Result<(), DeviceError> {
        for (ch, speed) in self.channels.iter_mut().zip(speeds) {
            ch.set_speed(i32::from(speed))?;
        }
        Ok(())
    }

    /// Coast every channel.
    pub fn stop_all(&mut self) -> Result<(), DeviceError> {
        self.set_all([0; MOTOR_COUNT])
    }

    /// Speeds currently applied, in channel order.
    pub fn speeds(&self) -> [i16; MOTOR_COUNT] {
        let mut out = [0; MOTOR_COUNT];
        for (o, ch) in out.iter_mut().zip(&self.channels) {
            *o = ch.speed();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::{
        digital::{Mock as PinMock, State, Transaction as PinTransaction},
        pwm::{Mock as PwmMock, Transaction as PwmTransaction},
    };

    use super::*;

    struct Wiring {
        in1: PinMock,
        in2: PinMock,
        en: PwmMock,
    }

    impl Wiring {
        fn new(
            in1: &[PinTransaction],
            in2: &[PinTransaction],
            en: &[PwmTransaction],
        ) -> Self {
            Self {
                in1: PinMock::new(in1),
                in2: PinMock::new(in2),
                en: PwmMock::new(en),
            }
        }

        fn channel(&self) -> MotorChannel<PinMock, PwmMock> {
            MotorChannel::new(self.in1.clone(), self.in2.clone(), self.en.clone())
        }

        fn done(&mut self) {
            self.in1.done();
            self.in2.done();
            self.en.done();
        }
    }

    fn set(state: State) -> PinTransaction {
        PinTransaction::set(state)
    }

    #[test]
    fn forward_sets_in1_and_duty() {
        let mut w = Wiring::new(
            &[set(State::High)],
            &[set(State::Low)],
            &[
                PwmTransaction::max_duty_cycle(255),
                PwmTransaction::set_duty_cycle(100),
            ],
        );
        let mut ch = w.channel();
        ch.set_speed(100).unwrap();
        assert_eq!(ch.speed(), 100);
        w.done();
    }

    #[test]
    fn reverse_sets_in2_and_magnitude() {
        let mut w = Wiring::new(
            &[set(State::Low)],
            &[set(State::High)],
            &[
                PwmTransaction::max_duty_cycle(255),
                PwmTransaction::set_duty_cycle(100),
            ],
        );
        let mut ch = w.channel();
        ch.set_speed(-100).unwrap();
        assert_eq!(ch.speed(), -100);
        w.done();
    }

    #[test]
    fn zero_coasts() {
        let mut w = Wiring::new(
            &[set(State::Low)],
            &[set(State::Low)],
            &[PwmTransaction::set_duty_cycle(0)],
        );
        let mut ch = w.channel();
        ch.set_speed(0).unwrap();
        assert_eq!(ch.speed(), 0);
        w.done();
    }

    #[test]
    fn oversized_speeds_clamp_but_keep_direction() {
        let mut w = Wiring::new(
            &[set(State::High), set(State::Low)],
            &[set(State::Low), set(State::High)],
            &[
                PwmTransaction::max_duty_cycle(255),
                PwmTransaction::set_duty_cycle(255),
                PwmTransaction::max_duty_cycle(255),
                PwmTransaction::set_duty_cycle(255),
            ],
        );
        let mut ch = w.channel();
        ch.set_speed(300).unwrap();
        assert_eq!(ch.speed(), 255);
        ch.set_speed(-40_000).unwrap();
        assert_eq!(ch.speed(), -255);
        w.done();
    }

    #[test]
    fn duty_scales_to_timer_resolution() {
        // a 16-bit timer: 255 of 255 is full scale, 51 of 255 is a fifth
        let mut w = Wiring::new(
            &[set(State::High)],
            &[set(State::Low)],
            &[
                PwmTransaction::max_duty_cycle(65_535),
                PwmTransaction::set_duty_cycle(13_107),
            ],
        );
        let mut ch = w.channel();
        ch.set_speed(51).unwrap();
        w.done();
    }

    #[test]
    fn clamp_speed_bounds() {
        assert_eq!(clamp_speed(0), 0);
        assert_eq!(clamp_speed(255), 255);
        assert_eq!(clamp_speed(256), 255);
        assert_eq!(clamp_speed(-256), -255);
        assert_eq!(clamp_speed(i32::MIN), -255);
    }

    #[test]
    fn unknown_channel_is_a_no_op() {
        let mut wirings = [
            Wiring::new(&[], &[], &[]),
            Wiring::new(&[], &[], &[]),
            Wiring::new(&[], &[], &[]),
            Wiring::new(&[], &[], &[]),
        ];
        let mut driver = MotorDriver::new([
            wirings[0].channel(),
            wirings[1].channel(),
            wirings[2].channel(),
            wirings[3].channel(),
        ]);
        driver.set_speed(4, 200).unwrap();
        driver.set_speed(usize::MAX, -200).unwrap();
        assert_eq!(driver.speeds(), [0; MOTOR_COUNT]);
        for w in wirings.iter_mut() {
            w.done();
        }
    }
}
