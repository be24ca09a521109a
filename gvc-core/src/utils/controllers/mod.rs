//! Hardware components and the main control loop.
//!
//! - `motors`: four H-bridge channels with signed speed control
//! - `ultrasonic`: trigger/echo ranger array
//! - `lidar`: byte-stream framing for the serial LiDAR
//! - `battery`: pack voltage, charger status and charger enable
//!
//! `SystemController` owns every component and all of the vehicle state. It runs on a single
//! thread; nothing in here is shared or locked.

pub mod battery;
pub mod lidar;
pub mod motors;
pub mod ultrasonic;

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    pwm::SetDutyCycle,
};
use embedded_hal_nb::serial;
use serde::Serialize;

use crate::utils::{
    config::{ControllerConfig, MOTOR_COUNT, SONAR_COUNT},
    connection::{Command, CommandReader, Report},
    error::DeviceError,
    hal::{AdcChannel, Clock, EchoPulse},
    timing::{LoopStats, Tick, Ticker},
    Duration,
};

pub use battery::{BatteryMonitor, BatteryState, ChargeSwitch, VoltageScale};
pub use lidar::{FrameCheck, LidarFrameReader};
pub use motors::{MotorChannel, MotorDriver};
pub use ultrasonic::{PulseTiming, UltrasonicArray, UltrasonicSensor};

/// Concrete hardware types of one board.
///
/// Only used as a type-level bundle, so board crates typically implement it on a unit struct.
pub trait Board {
    type DirPin: OutputPin;
    type MotorPwm: SetDutyCycle;
    type Trigger: OutputPin;
    type Echo: EchoPulse;
    type HostPort: serial::Read<u8> + serial::Write<u8>;
    type LidarPort: serial::Read<u8>;
    type BatteryAdc: AdcChannel;
    type ChargeControl: OutputPin;
    type ChargeStatus: InputPin;
    type Delay: DelayNs;
    type Clock: Clock;
}

/// Everything the controller takes ownership of at startup.
pub struct Peripherals<B: Board> {
    pub motors: [MotorChannel<B::DirPin, B::MotorPwm>; MOTOR_COUNT],
    pub sonars: [UltrasonicSensor<B::Trigger, B::Echo>; SONAR_COUNT],
    pub host: B::HostPort,
    pub lidar: B::LidarPort,
    pub battery_adc: B::BatteryAdc,
    pub charge_control: B::ChargeControl,
    pub charge_status: B::ChargeStatus,
    pub delay: B::Delay,
    pub clock: B::Clock,
}

/// Everything the vehicle knows about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ControllerState {
    pub motor_speeds: [i16; MOTOR_COUNT],
    pub ultrasonic_cm: [f32; SONAR_COUNT],
    /// Last LiDAR distance; only changes when a full frame arrives.
    pub lidar_cm: f32,
    pub battery: BatteryState,
    /// Charger enable output as last commanded.
    pub charge_enabled: bool,
}

impl From<&ControllerState> for Report {
    fn from(state: &ControllerState) -> Self {
        Report {
            ultrasonic: state.ultrasonic_cm,
            lidar: state.lidar_cm,
            battery: state.battery.voltage,
            charging: state.battery.charging,
        }
    }
}

/// Single-threaded vehicle controller.
///
/// Each iteration: take at most one command line from the host and apply it, re-measure
/// every sensor, then sleep out the rest of the loop period.
pub struct SystemController<B: Board> {
    state: ControllerState,
    config: ControllerConfig,

    motors: MotorDriver<B::DirPin, B::MotorPwm>,
    sonar: UltrasonicArray<B::Trigger, B::Echo>,
    lidar: LidarFrameReader,
    battery: BatteryMonitor<B::BatteryAdc, B::ChargeStatus>,
    charger: ChargeSwitch<B::ChargeControl>,

    host: B::HostPort,
    lidar_port: B::LidarPort,
    commands: CommandReader,

    delay: B::Delay,
    clock: B::Clock,
    ticker: Ticker,
    stats: LoopStats,
}

impl<B: Board> SystemController<B> {
    /// Take the peripherals, stop every motor and switch charging off.
    pub fn new(
        p: Peripherals<B>,
        config: ControllerConfig,
    ) -> Self {
        let check = if config.lidar_checksum {
            FrameCheck::Sum
        } else {
            FrameCheck::None
        };

        let mut ctrl = SystemController {
            state: ControllerState::default(),
            motors: MotorDriver::new(p.motors),
            sonar: UltrasonicArray::new(p.sonars, PulseTiming::from(&config)),
            lidar: LidarFrameReader::new(check),
            battery: BatteryMonitor::new(
                p.battery_adc,
                p.charge_status,
                VoltageScale::from(&config),
            ),
            charger: ChargeSwitch::new(p.charge_control),
            host: p.host,
            lidar_port: p.lidar,
            commands: CommandReader::new(),
            delay: p.delay,
            clock: p.clock,
            ticker: Ticker::new(Duration::from_millis(u64::from(config.loop_period_ms))),
            stats: LoopStats::default(),
            config,
        };

        if let Err(e) = ctrl.motors.stop_all() {
            tracing::warn!(error = %e, "failed to stop motors at startup");
        }
        if let Err(e) = ctrl.charger.set(false) {
            tracing::warn!(error = %e, "failed to disable charger at startup");
        }

        tracing::info!(
            period_ms = config.loop_period_ms,
            host_baud = config.host_baud,
            lidar_baud = config.lidar_baud,
            lidar_checksum = config.lidar_checksum,
            "controller ready"
        );
        ctrl
    }

    #[inline]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    #[inline]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// LiDAR frames accepted and rejected so far.
    pub fn lidar_frames(&self) -> (u32, u32) {
        (self.lidar.frames(), self.lidar.rejected())
    }

    /// Apply one command.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn dispatch(
        &mut self,
        cmd: Command,
    ) -> Result<(), DeviceError> {
        match cmd {
            Command::SetMotors { speeds } => {
                let res = self.motors.set_all(speeds);
                self.state.motor_speeds = self.motors.speeds();
                res
            }
            Command::RequestSensorData => Report::from(&self.state).emit(&mut self.host),
            Command::SetCharging { enabled } => {
                let res = self.charger.set(enabled);
                self.state.charge_enabled = self.charger.is_enabled();
                res
            }
            Command::Unrecognized => Ok(()),
        }
    }

    /// Stop every motor and record the zero speeds.
    pub fn stop_all(&mut self) -> Result<(), DeviceError> {
        let res = self.motors.stop_all();
        self.state.motor_speeds = self.motors.speeds();
        res
    }

    /// Re-measure the ultrasonic array, drain the LiDAR port and sample the battery.
    ///
    /// A failing sensor keeps its previous value; the others are still refreshed.
    pub fn refresh_sensors(&mut self) {
        if let Err(e) = self
            .sonar
            .refresh(&mut self.delay, &mut self.state.ultrasonic_cm)
        {
            tracing::warn!(error = %e, "ultrasonic refresh incomplete");
        }

        match self
            .lidar
            .poll(&mut self.lidar_port, self.config.max_bytes_per_poll)
        {
            Ok(Some(cm)) => self.state.lidar_cm = f32::from(cm),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "lidar read failed"),
        }

        match self.battery.refresh() {
            Ok(battery) => self.state.battery = battery,
            Err(e) => tracing::warn!(error = %e, "battery refresh failed"),
        }

        tracing::trace!(state = ?self.state, "sensors refreshed");
    }

    /// One loop iteration without the trailing sleep. Returns the command handled, if any.
    pub fn step(&mut self) -> Option<Command> {
        let cmd = match self
            .commands
            .poll(&mut self.host, self.config.max_bytes_per_poll)
        {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(error = %e, "host link read failed");
                None
            }
        };

        if let Some(cmd) = cmd {
            if let Err(e) = self.dispatch(cmd) {
                tracing::warn!(?cmd, error = %e, "command failed");
            }
        }

        self.refresh_sensors();
        cmd
    }

    /// One full loop period: `step`, then wait for the next deadline.
    pub fn tick(&mut self) -> Tick {
        let started = self.clock.now();
        self.ticker.arm(started);

        self.step();

        let finished = self.clock.now();
        let tick = self.ticker.next(finished);
        self.stats.record(finished - started, tick);

        match tick {
            Tick::Wait(remaining) => {
                self.delay
                    .delay_us(u32::try_from(remaining.as_micros()).unwrap_or(u32::MAX));
            }
            Tick::Overrun(late) => {
                tracing::warn!(late_us = late.as_micros(), "loop overran its period");
            }
        }
        tick
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }
}
