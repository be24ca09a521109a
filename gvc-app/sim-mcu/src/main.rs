//! Runs the vehicle controller on the host against simulated hardware.
//!
//! The host link is bridged to stdin/stdout (or a script file), so the ASCII protocol can be
//! driven by hand: type `M,100,100,100,100` or `S` and read back `DATA:` lines. Logs go to
//! stderr and are filtered with `RUST_LOG`.

use clap::Parser;
use embassy_executor::Executor;
use embassy_time::{Duration, Instant};
use embedded_hal::{digital, pwm};
use embedded_hal_mock::eh1::delay::StdSleep;
use embedded_hal_nb::serial;
use gvc_core::utils::controllers::{
    Board, ControllerState, MotorChannel, Peripherals, UltrasonicSensor, lidar::SYNC_BYTE,
    ultrasonic::SOUND_CM_PER_US,
};
use gvc_core::utils::hal::{AdcChannel, Clock, PolledEcho};
use gvc_core::utils::timing::LoopStats;
use gvc_core::utils::{ControllerConfig, PIN_MAP, SystemController};
use serde::Serialize;
use static_cell::StaticCell;
use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{self, TryRecvError};
use std::{fs, thread};
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version = "1.0", about = "Ground vehicle controller on simulated hardware")]
struct Opts
{
    /// JSON file overriding controller settings
    #[clap(long)]
    config: Option<PathBuf>,
    /// read host commands from this file instead of stdin
    #[clap(long)]
    script: Option<PathBuf>,
    /// stop after this many loop iterations
    #[clap(long)]
    iterations: Option<u64>,
    /// obstacle distance in front of each ultrasonic sensor, in cm
    #[clap(long, value_delimiter = ',', default_values_t = [40.0, 80.0, 20.0, 150.0])]
    obstacles_cm: Vec<f32>,
    /// distance reported by the LiDAR, in cm
    #[clap(long, default_value_t = 250)]
    lidar_cm: u16,
    /// raw battery ADC reading
    #[clap(long, default_value_t = 800)]
    battery_raw: u16,
    /// print controller state and loop statistics as JSON on exit
    #[clap(long)]
    json: bool,
}

/// GPIO line kept in memory. Clones share the level, so an output can be read back as an input.
#[derive(Clone)]
struct SimPin {
    pin: u8,
    level: Rc<Cell<bool>>,
}

impl SimPin {
    fn new(pin: u8) -> Self {
        Self {
            pin,
            level: Rc::default(),
        }
    }

    /// Same line seen through another pin number.
    fn alias(
        &self,
        pin: u8,
    ) -> Self {
        Self {
            pin,
            level: self.level.clone(),
        }
    }

    fn drive(
        &mut self,
        high: bool,
    ) {
        if self.level.replace(high) != high {
            trace!(pin = self.pin, high, "gpio");
        }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl digital::OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

impl digital::InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.get())
    }
}

/// 8-bit PWM output.
struct SimPwm {
    pin: u8,
    duty: u16,
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Infallible> {
        if self.duty != duty {
            debug!(pin = self.pin, duty, "pwm");
        }
        self.duty = duty;
        Ok(())
    }
}

/// Trigger output. The falling edge of the trigger pulse starts the simulated echo.
struct SimTrigger {
    pin: SimPin,
    fired: Rc<Cell<Option<Instant>>>,
}

impl digital::ErrorType for SimTrigger {
    type Error = Infallible;
}

impl digital::OutputPin for SimTrigger {
    fn set_low(&mut self) -> Result<(), Infallible> {
        if self.pin.level.get() {
            self.fired.set(Some(Instant::now()));
        }
        self.pin.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.pin.drive(true);
        Ok(())
    }
}

/// Echo line of an HC-SR04 facing an obstacle `distance_cm` away.
struct SimEchoLine {
    fired: Rc<Cell<Option<Instant>>>,
    width: Option<Duration>,
}

impl SimEchoLine {
    /// Time from trigger to the rising edge of the echo.
    const LEAD: Duration = Duration::from_micros(200);

    fn new(
        fired: Rc<Cell<Option<Instant>>>,
        distance_cm: f32,
    ) -> Self {
        let width = (distance_cm > 0.0)
            .then(|| Duration::from_micros((distance_cm * 2.0 / SOUND_CM_PER_US) as u64));
        Self { fired, width }
    }
}

impl digital::ErrorType for SimEchoLine {
    type Error = Infallible;
}

impl digital::InputPin for SimEchoLine {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let (Some(fired), Some(width)) = (self.fired.get(), self.width) else {
            return Ok(false);
        };
        let since = Instant::now() - fired;
        Ok(since >= Self::LEAD && since < Self::LEAD + width)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

#[derive(Clone, Copy)]
struct HostClock;

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct SimAdc(u16);

impl AdcChannel for SimAdc {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Infallible> {
        Ok(self.0)
    }
}

/// LiDAR that streams one frame per poll, with a stray byte in front of every eighth frame.
struct SimLidar {
    distance_cm: u16,
    pending: VecDeque<u8>,
    sent: u32,
}

impl SimLidar {
    fn new(distance_cm: u16) -> Self {
        Self {
            distance_cm,
            pending: VecDeque::new(),
            sent: 0,
        }
    }

    fn queue_frame(&mut self) {
        if self.sent % 8 == 7 {
            self.pending.push_back(0x00);
        }
        let [lo, hi] = self.distance_cm.to_le_bytes();
        let mut frame = [SYNC_BYTE, SYNC_BYTE, lo, hi, 0x40, 0x01, 0x60, 0x09, 0x00];
        frame[8] = frame[..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        self.pending.extend(frame);
        self.sent = self.sent.wrapping_add(1);
    }
}

impl serial::ErrorType for SimLidar {
    type Error = Infallible;
}

impl serial::Read<u8> for SimLidar {
    fn read(&mut self) -> nb::Result<u8, Infallible> {
        match self.pending.pop_front() {
            Some(b) => Ok(b),
            None => {
                self.queue_frame();
                Err(nb::Error::WouldBlock)
            }
        }
    }
}

/// Host link: bytes come from the input thread, replies go to stdout line by line.
struct HostLink {
    rx: mpsc::Receiver<u8>,
    closed: Rc<Cell<bool>>,
    line: Vec<u8>,
}

impl serial::ErrorType for HostLink {
    type Error = serial::ErrorKind;
}

impl serial::Read<u8> for HostLink {
    fn read(&mut self) -> nb::Result<u8, serial::ErrorKind> {
        match self.rx.try_recv() {
            Ok(b) => Ok(b),
            Err(TryRecvError::Empty) => Err(nb::Error::WouldBlock),
            Err(TryRecvError::Disconnected) => {
                self.closed.set(true);
                Err(nb::Error::WouldBlock)
            }
        }
    }
}

impl serial::Write<u8> for HostLink {
    fn write(
        &mut self,
        word: u8,
    ) -> nb::Result<(), serial::ErrorKind> {
        self.line.push(word);
        if word == b'\n' {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), serial::ErrorKind> {
        let mut out = io::stdout().lock();
        out.write_all(&self.line)
            .and_then(|_| out.flush())
            .map_err(|_| nb::Error::Other(serial::ErrorKind::Other))?;
        self.line.clear();
        Ok(())
    }
}

struct SimBoard;

impl Board for SimBoard {
    type DirPin = SimPin;
    type MotorPwm = SimPwm;
    type Trigger = SimTrigger;
    type Echo = PolledEcho<SimEchoLine, HostClock>;
    type HostPort = HostLink;
    type LidarPort = SimLidar;
    type BatteryAdc = SimAdc;
    type ChargeControl = SimPin;
    type ChargeStatus = SimPin;
    type Delay = StdSleep;
    type Clock = HostClock;
}

/// Wire up a simulated board. The charger reports "charging" whenever it is enabled.
fn sim_board(
    opts: &Opts,
    obstacles_cm: [f32; 4],
    rx: mpsc::Receiver<u8>,
    closed: Rc<Cell<bool>>,
) -> Peripherals<SimBoard> {
    let charge_control = SimPin::new(PIN_MAP.charge_control);
    let charge_status = charge_control.alias(PIN_MAP.charge_status);

    Peripherals {
        motors: PIN_MAP.motors.map(|m| {
            MotorChannel::new(
                SimPin::new(m.in1),
                SimPin::new(m.in2),
                SimPwm { pin: m.en, duty: 0 },
            )
        }),
        sonars: std::array::from_fn(|i| {
            let fired = Rc::new(Cell::new(None));
            let trigger = SimTrigger {
                pin: SimPin::new(PIN_MAP.sonars[i].trig),
                fired: fired.clone(),
            };
            let echo = PolledEcho::new(SimEchoLine::new(fired, obstacles_cm[i]), HostClock);
            UltrasonicSensor::new(trigger, echo)
        }),
        host: HostLink {
            rx,
            closed,
            line: Vec::new(),
        },
        lidar: SimLidar::new(opts.lidar_cm),
        battery_adc: SimAdc(opts.battery_raw),
        charge_control,
        charge_status,
        delay: StdSleep::new(),
        clock: HostClock,
    }
}

/// Feed host commands, one byte at a time, from the script file or stdin.
fn spawn_input(script: Option<&PathBuf>) -> io::Result<mpsc::Receiver<u8>> {
    let reader: Box<dyn BufRead + Send> = match script {
        Some(path) => Box::new(io::BufReader::new(fs::File::open(path)?)),
        None => Box::new(io::BufReader::new(io::stdin())),
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            for b in line.bytes().chain([b'\n']) {
                if tx.send(b).is_err() {
                    return;
                }
            }
        }
    });
    Ok(rx)
}

#[derive(Serialize)]
struct Summary<'a> {
    state: &'a ControllerState,
    stats: &'a LoopStats,
    lidar_frames: u32,
    lidar_rejected: u32,
}

#[embassy_executor::task]
async fn control_task(
    mut ctrl: SystemController<SimBoard>,
    input_closed: Rc<Cell<bool>>,
    iterations: Option<u64>,
    json: bool,
) {
    let mut done = 0u64;
    loop {
        match iterations {
            Some(max) if done >= max => break,
            None if input_closed.get() => break,
            _ => {}
        }
        ctrl.tick();
        done += 1;
    }

    if let Err(e) = ctrl.stop_all() {
        error!(error = %e, "failed to stop motors");
    }
    info!(
        iterations = done,
        overruns = ctrl.stats().overruns,
        max_busy_us = ctrl.stats().max_busy_us,
        "simulation finished"
    );

    if json {
        let (lidar_frames, lidar_rejected) = ctrl.lidar_frames();
        let summary = Summary {
            state: ctrl.state(),
            stats: ctrl.stats(),
            lidar_frames,
            lidar_rejected,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{s}"),
            Err(e) => error!(error = %e, "failed to encode summary"),
        }
    }
    std::process::exit(0);
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opts = Opts::parse();
    let config: ControllerConfig = match &opts.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => ControllerConfig::DEFAULT,
    };
    let obstacles_cm: [f32; 4] = opts
        .obstacles_cm
        .as_slice()
        .try_into()
        .map_err(|_| "--obstacles-cm takes exactly four distances")?;

    let rx = spawn_input(opts.script.as_ref())?;
    let input_closed = Rc::new(Cell::new(false));
    let board = sim_board(&opts, obstacles_cm, rx, input_closed.clone());
    let ctrl = SystemController::new(board, config);
    info!(
        script = ?opts.script,
        obstacles_cm = ?obstacles_cm,
        lidar_cm = opts.lidar_cm,
        "simulated board ready"
    );

    let (iterations, json) = (opts.iterations, opts.json);
    let executor = EXECUTOR.init(Executor::new());
    executor.run(move |spawner| {
        if let Err(e) = spawner.spawn(control_task(ctrl, input_closed, iterations, json)) {
            error!(error = ?e, "failed to spawn control task");
            std::process::exit(1);
        }
    })
}
