//! Recording fakes shared by the integration tests.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    convert::Infallible,
    rc::Rc,
};

use embedded_hal::{delay::DelayNs, digital, pwm};
use embedded_hal_nb::serial;
use gvc_core::utils::{
    controllers::{lidar::SYNC_BYTE, Board, MotorChannel, Peripherals, UltrasonicSensor},
    hal::{AdcChannel, Clock, EchoPulse},
    Instant,
};

/// Hand-moved clock, in microseconds.
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn advance_us(
        &self,
        us: u64,
    ) {
        self.0.set(self.0.get() + us);
    }

    pub fn micros(&self) -> u64 {
        self.0.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.0.get())
    }
}

/// Delay that moves the shared clock instead of sleeping.
pub struct ClockDelay(pub ManualClock);

impl DelayNs for ClockDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.0.advance_us(u64::from(ns) / 1_000);
    }
}

/// Output/input pin that records every level it is driven to.
#[derive(Clone, Default)]
pub struct FakePin(Rc<RefCell<Vec<bool>>>);

impl FakePin {
    pub fn history(&self) -> Vec<bool> {
        self.0.borrow().clone()
    }

    pub fn level(&self) -> bool {
        self.0.borrow().last().copied().unwrap_or(false)
    }

    /// Drive the line from the outside (for input pins).
    pub fn drive(
        &self,
        high: bool,
    ) {
        self.0.borrow_mut().push(high);
    }
}

impl digital::ErrorType for FakePin {
    type Error = Infallible;
}

impl digital::OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

impl digital::InputPin for FakePin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level())
    }
}

/// 8-bit PWM channel recording every duty written.
#[derive(Clone, Default)]
pub struct FakePwm(Rc<RefCell<Vec<u16>>>);

impl FakePwm {
    pub fn duty(&self) -> u16 {
        self.0.borrow().last().copied().unwrap_or(0)
    }

    pub fn history(&self) -> Vec<u16> {
        self.0.borrow().clone()
    }
}

impl pwm::ErrorType for FakePwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Infallible> {
        self.0.borrow_mut().push(duty);
        Ok(())
    }
}

/// Echo sensor with an adjustable pulse width; waiting for it moves the clock.
#[derive(Clone)]
pub struct FakeEcho {
    width_us: Rc<Cell<u32>>,
    clock: ManualClock,
}

impl FakeEcho {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            width_us: Rc::default(),
            clock,
        }
    }

    pub fn set_width_us(
        &self,
        us: u32,
    ) {
        self.width_us.set(us);
    }
}

impl EchoPulse for FakeEcho {
    type Error = Infallible;

    fn pulse_width_us(
        &mut self,
        timeout_us: u32,
    ) -> Result<u32, Infallible> {
        let width = self.width_us.get();
        if width > timeout_us {
            self.clock.advance_us(u64::from(timeout_us));
            Ok(0)
        } else {
            self.clock.advance_us(u64::from(width));
            Ok(width)
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeAdc(Rc<Cell<u16>>);

impl FakeAdc {
    pub fn set(
        &self,
        raw: u16,
    ) {
        self.0.set(raw);
    }
}

impl AdcChannel for FakeAdc {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Infallible> {
        Ok(self.0.get())
    }
}

/// Serial port backed by in-memory queues.
#[derive(Clone, Default)]
pub struct FakeSerial {
    rx: Rc<RefCell<VecDeque<u8>>>,
    tx: Rc<RefCell<Vec<u8>>>,
}

impl FakeSerial {
    /// Queue bytes as if the peer had sent them.
    pub fn inject(
        &self,
        bytes: &[u8],
    ) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    /// Everything written so far, as text, and clear it.
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut *self.tx.borrow_mut());
        String::from_utf8(bytes).expect("utf-8 output")
    }

    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }
}

impl serial::ErrorType for FakeSerial {
    type Error = Infallible;
}

impl serial::Read<u8> for FakeSerial {
    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.rx.borrow_mut().pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for FakeSerial {
    fn write(
        &mut self,
        word: u8,
    ) -> nb::Result<(), Infallible> {
        self.tx.borrow_mut().push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        Ok(())
    }
}

pub struct FakeBoard;

impl Board for FakeBoard {
    type DirPin = FakePin;
    type MotorPwm = FakePwm;
    type Trigger = FakePin;
    type Echo = FakeEcho;
    type HostPort = FakeSerial;
    type LidarPort = FakeSerial;
    type BatteryAdc = FakeAdc;
    type ChargeControl = FakePin;
    type ChargeStatus = FakePin;
    type Delay = ClockDelay;
    type Clock = ManualClock;
}

/// Test-side handles onto every fake the controller owns.
pub struct Rig {
    pub in1: [FakePin; 4],
    pub in2: [FakePin; 4],
    pub enable: [FakePwm; 4],
    pub triggers: [FakePin; 4],
    pub echoes: [FakeEcho; 4],
    pub host: FakeSerial,
    pub lidar: FakeSerial,
    pub adc: FakeAdc,
    pub charge_control: FakePin,
    pub charge_status: FakePin,
    pub clock: ManualClock,
}

impl Rig {
    pub fn new() -> (Self, Peripherals<FakeBoard>) {
        let clock = ManualClock::default();
        let rig = Rig {
            in1: Default::default(),
            in2: Default::default(),
            enable: Default::default(),
            triggers: Default::default(),
            echoes: std::array::from_fn(|_| FakeEcho::new(clock.clone())),
            host: FakeSerial::default(),
            lidar: FakeSerial::default(),
            adc: FakeAdc::default(),
            charge_control: FakePin::default(),
            charge_status: FakePin::default(),
            clock,
        };

        let p = Peripherals {
            motors: std::array::from_fn(|i| {
                MotorChannel::new(rig.in1[i].clone(), rig.in2[i].clone(), rig.enable[i].clone())
            }),
            sonars: std::array::from_fn(|i| {
                UltrasonicSensor::new(rig.triggers[i].clone(), rig.echoes[i].clone())
            }),
            host: rig.host.clone(),
            lidar: rig.lidar.clone(),
            battery_adc: rig.adc.clone(),
            charge_control: rig.charge_control.clone(),
            charge_status: rig.charge_status.clone(),
            delay: ClockDelay(rig.clock.clone()),
            clock: rig.clock.clone(),
        };
        (rig, p)
    }

    pub fn set_echo_widths(
        &self,
        widths: [u32; 4],
    ) {
        for (echo, w) in self.echoes.iter().zip(widths) {
            echo.set_width_us(w);
        }
    }

    /// Direction pin levels and duty of one motor channel.
    pub fn motor(
        &self,
        ch: usize,
    ) -> (bool, bool, u16) {
        (self.in1[ch].level(), self.in2[ch].level(), self.enable[ch].duty())
    }
}

/// A checksummed LiDAR frame carrying `cm`.
pub fn lidar_frame(cm: u16) -> [u8; 9] {
    let [lo, hi] = cm.to_le_bytes();
    let mut f = [SYNC_BYTE, SYNC_BYTE, lo, hi, 0x10, 0x00, 0x80, 0x0A, 0];
    f[8] = f[..8].iter().fold(0u8, |a, &b| a.wrapping_add(b));
    f
}
