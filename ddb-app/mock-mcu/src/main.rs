use clap::Parser;
use ddb_core::mk_static;
use ddb_core::utils::config::ControlConfig;
use ddb_core::utils::connection::link::{associate, NetworkError};
use ddb_core::utils::controllers::{
    estop::EmergencyInput,
    imu::{Mpu6050, MPU6050_ADDRESS},
    init_imu,
    motor::{DriveTrain, HBridge},
    notify, StatusEvent, StatusIndicator, STATUS_CHANNEL,
};
use ddb_core::utils::{http, Duration, GainParameter, SystemController, Timer};
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType as I2cErrorType, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use static_cell::StaticCell;
use std::convert::Infallible;
use std::path::PathBuf;
use tracing::{debug, error, info, trace, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// HTTP port for the command server
    #[clap(long, default_value_t = 8000)]
    port: u16,
    /// JSON file with control loop settings
    #[clap(long)]
    config: Option<PathBuf>,
    /// initial gain, overrides the config file
    #[clap(long)]
    kp: Option<f32>,
    /// the emergency button reads as pressed while this file exists
    #[clap(long)]
    estop_file: Option<PathBuf>,
    /// simulate an IMU that does not answer on the bus
    #[clap(long)]
    fail_init: bool,
}

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// MPU-6050 register model driven by a scripted motion profile.
///
/// The bot rocks slowly along X and sees a short Y-axis rate spike every
/// 30 seconds, enough to trip the default gyro threshold.
struct SimImuBus {
    started: std::time::Instant,
    register: u8,
    accel_config: u8,
    offline: bool,
}

impl SimImuBus {
    fn new(offline: bool) -> Self {
        Self {
            started: std::time::Instant::now(),
            register: 0,
            accel_config: 0,
            offline,
        }
    }

    fn registers(&self) -> [u8; 14] {
        let t = self.started.elapsed().as_secs_f32();
        let accel_lsb = 16384.0 / (1u32 << ((self.accel_config >> 3) & 0x03)) as f32;

        let accel = [
            0.3 * (core::f32::consts::TAU * t / 8.0).sin(),
            0.02,
            0.98,
        ];
        let phase = t % 30.0;
        let yaw = if (15.0..15.3).contains(&phase) { 450.0 } else { 0.0 };
        let gyro = [0.0, yaw, 20.0 * (core::f32::consts::TAU * t / 8.0).cos()];
        let temp = (25.0 - 36.53) * 340.0;

        let words = [
            accel[0] * accel_lsb,
            accel[1] * accel_lsb,
            accel[2] * accel_lsb,
            temp,
            gyro[0] * 131.0,
            gyro[1] * 131.0,
            gyro[2] * 131.0,
        ];
        let mut out = [0u8; 14];
        for (chunk, w) in out.chunks_exact_mut(2).zip(words) {
            let raw = w.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            chunk.copy_from_slice(&raw.to_be_bytes());
        }
        out
    }
}

impl I2cErrorType for SimImuBus {
    type Error = ErrorKind;
}

impl I2c for SimImuBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.offline || address != MPU6050_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let Some((&reg, value)) = bytes.split_first() else {
                        continue;
                    };
                    self.register = reg;
                    match (reg, value.first()) {
                        (0x1C, Some(&v)) => self.accel_config = v,
                        (0x6B, Some(&v)) => trace!("PWR_MGMT_1 <- 0x{:02X}", v),
                        _ => {}
                    }
                }
                Operation::Read(buf) => match self.register {
                    0x75 => buf.fill(0x68),
                    0x3B => {
                        let regs = self.registers();
                        let n = buf.len().min(regs.len());
                        buf[..n].copy_from_slice(&regs[..n]);
                    }
                    _ => buf.fill(0),
                },
            }
        }
        Ok(())
    }
}

/// PWM output that logs duty changes.
struct SimPwm {
    name: &'static str,
    duty: u16,
}

impl PwmErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if duty != self.duty {
            debug!("{} duty {} -> {}", self.name, self.duty, duty);
            self.duty = duty;
        }
        Ok(())
    }
}

/// Direction line that logs level changes.
struct SimLine {
    name: &'static str,
    high: bool,
}

impl PinErrorType for SimLine {
    type Error = Infallible;
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            trace!("{} low", self.name);
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            trace!("{} high", self.name);
        }
        self.high = true;
        Ok(())
    }
}

/// Active-low button backed by the presence of a file.
struct SimButton {
    path: Option<PathBuf>,
}

impl PinErrorType for SimButton {
    type Error = Infallible;
}

impl InputPin for SimButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.path.as_ref().is_some_and(|p| p.exists()))
    }
}

struct SimDelay;

impl DelayNs for SimDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        std::thread::sleep(std::time::Duration::from_nanos(ns.into()));
    }
}

/// LED driver that logs to console
struct SerialLedDriver;

impl SmartLedsWrite for SerialLedDriver {
    type Color = RGB8;
    type Error = Infallible;

    fn write<T, I>(
        &mut self,
        iterator: T,
    ) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for c in iterator {
            let c: RGB8 = c.into();
            debug!("LED: ({}, {}, {})", c.r, c.g, c.b);
        }
        Ok(())
    }
}

type Bridge = HBridge<SimPwm, SimLine, SimLine>;
type Controller = SystemController<Mpu6050<SimImuBus>, SimButton, SimDelay, Bridge, Bridge, SimLine>;

fn bridge([pwm, fwd, bwd]: [&'static str; 3]) -> Bridge {
    HBridge::new(
        SimPwm { name: pwm, duty: 0 },
        SimLine {
            name: fwd,
            high: false,
        },
        SimLine {
            name: bwd,
            high: false,
        },
    )
}

fn load_config(path: Option<&std::path::Path>) -> Result<ControlConfig, String> {
    let Some(path) = path else {
        return Ok(ControlConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn control_task(mut ctrl: Controller) -> ! {
    ctrl.run().await
}

#[embassy_executor::task]
async fn status_task(mut indicator: StatusIndicator<SerialLedDriver>) -> ! {
    loop {
        let event = STATUS_CHANNEL.receiver().receive().await;
        if let Err(e) = indicator.ex_event(event) {
            error!("LED update failed: {:?}", e);
        }
    }
}

/// Blink the fault colour forever. Runs instead of the control loop after an
/// IMU or network startup failure.
#[embassy_executor::task]
async fn fault_task() -> ! {
    loop {
        notify(StatusEvent::Fault);
        Timer::after_millis(100).await;
    }
}

/// Open the TAP device, start the stack and wait for an address.
async fn bring_up_network(
    spawner: Spawner,
    opts: &Opts,
    timeout: Duration,
) -> Result<Stack<'static>, NetworkError> {
    let device = TunTapDevice::new(&opts.tap).map_err(|e| {
        error!("cannot open TAP device {}: {}", opts.tap, e);
        NetworkError::Device
    })?;
    let net_config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    if let Err(e) = OsRng.try_fill_bytes(&mut seed_buf) {
        warn!("OS RNG unavailable, using a fixed seed: {}", e);
    }
    let seed = u64::from_le_bytes(seed_buf);

    let (stack, runner) = embassy_net::new(
        device,
        net_config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );
    spawner.must_spawn(net_task(runner));

    info!("Waiting for network link...");
    associate(stack, timeout).await?;
    Ok(stack)
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner) {
    let opts: Opts = Opts::parse();

    let config = match load_config(opts.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid config {}", e);
            std::process::exit(1);
        }
    };
    info!("control config: {:?}", config);

    let gain: &'static GainParameter = mk_static!(
        GainParameter,
        GainParameter::new(opts.kp.unwrap_or(config.initial_gain))
    );

    spawner.must_spawn(status_task(StatusIndicator::new(SerialLedDriver)));

    let imu = match init_imu(SimImuBus::new(opts.fail_init), MPU6050_ADDRESS, &config, &mut SimDelay) {
        Ok(imu) => imu,
        Err(e) => {
            error!("IMU init failed, control loop not started: {:?}", e);
            spawner.must_spawn(fault_task());
            return;
        }
    };

    let stack = match bring_up_network(spawner, &opts, config.association_timeout()).await {
        Ok(stack) => stack,
        Err(e) => {
            error!("network bring-up failed, control loop not started: {:?}", e);
            spawner.must_spawn(fault_task());
            return;
        }
    };

    let emergency = EmergencyInput::new(
        SimButton {
            path: opts.estop_file.clone(),
        },
        SimDelay,
        config.emergency_settle_us,
    );
    let drive = DriveTrain::with_standby(
        bridge(["left.pwm", "left.fwd", "left.bwd"]),
        bridge(["right.pwm", "right.fwd", "right.bwd"]),
        SimLine {
            name: "stby",
            high: false,
        },
    );
    let ctrl = SystemController::new(imu, emergency, drive, gain, config);
    spawner.must_spawn(control_task(ctrl));

    info!("Starting command server on port {}", opts.port);
    http(0, opts.port, stack, gain, None).await
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(main_task(spawner));
    });
}
