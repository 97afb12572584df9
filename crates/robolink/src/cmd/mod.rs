use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use robolink_link::{EventDispatcher, Link, LinkConfig};
use robolink_packet::{CommandKind, DataType, RotationDirection};
use robolink_transport::tcp::DEFAULT_READ_CHUNK_SIZE;
use robolink_transport::{DeviceTransport, TcpConfig, TcpTransport, DEFAULT_BAUD_RATE};

use crate::exit::{link_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every event the controller reports.
    Monitor(MonitorArgs),
    /// Send a single command.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the controller is.
#[derive(Args, Debug)]
#[group(id = "transport", required = true, multiple = false)]
pub struct TransportArgs {
    /// Connect to a controller at HOST:PORT.
    #[arg(long, value_name = "HOST:PORT", env = "ROBOLINK_TCP")]
    pub tcp: Option<String>,
    /// Wait for the controller to connect to HOST:PORT.
    #[arg(long, value_name = "HOST:PORT", env = "ROBOLINK_LISTEN")]
    pub listen: Option<String>,
    /// Open a serial device, raw 8N1.
    #[arg(long, value_name = "PATH", env = "ROBOLINK_DEVICE")]
    pub device: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Sender idle interval (e.g. 10ms).
    #[arg(long, default_value = "10ms", env = "ROBOLINK_SEND_INTERVAL")]
    pub send_interval: String,
    /// Drop commands left unacknowledged this long (e.g. 30s). Default: keep forever.
    #[arg(long, env = "ROBOLINK_PENDING_TTL")]
    pub pending_ttl: Option<String>,
    /// Bytes requested per read.
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE, env = "ROBOLINK_READ_CHUNK_SIZE")]
    pub read_chunk_size: usize,
    /// Line speed for --device.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, env = "ROBOLINK_BAUD")]
    pub baud: u32,
}

impl LinkArgs {
    pub fn link_config(&self) -> CliResult<LinkConfig> {
        Ok(LinkConfig {
            send_interval: parse_duration(&self.send_interval)?,
            pending_ttl: self.pending_ttl.as_deref().map(parse_duration).transpose()?,
            ..LinkConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub transport: TransportArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandArg {
    RightMotor,
    LeftMotor,
    BothMotor,
    MeasureDistance,
    MeasureLineTracer,
    MeasureNineAxis,
    UpperServo,
    BottomServo,
}

impl CommandArg {
    pub fn kind(self) -> CommandKind {
        match self {
            CommandArg::RightMotor => CommandKind::RightSteppingMotor,
            CommandArg::LeftMotor => CommandKind::LeftSteppingMotor,
            CommandArg::BothMotor => CommandKind::BothSteppingMotor,
            CommandArg::MeasureDistance => CommandKind::MeasureDistance,
            CommandArg::MeasureLineTracer => CommandKind::MeasureLineTracer,
            CommandArg::MeasureNineAxis => CommandKind::MeasureNineAxis,
            CommandArg::UpperServo => CommandKind::UpperServoMotor,
            CommandArg::BottomServo => CommandKind::BottomServoMotor,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    RightForward,
    LeftReturn,
    Locked,
}

impl From<DirectionArg> for RotationDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::RightForward => RotationDirection::RightForward,
            DirectionArg::LeftReturn => RotationDirection::LeftReturn,
            DirectionArg::Locked => RotationDirection::Locked,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DataTypeArg {
    /// Angular speed and total angle.
    Type1,
    /// Angular speed and duration.
    Type2,
    /// Continuous rotation at angular speed.
    Type3,
    /// Stop.
    Type4,
}

impl From<DataTypeArg> for DataType {
    fn from(arg: DataTypeArg) -> Self {
        match arg {
            DataTypeArg::Type1 => DataType::Type1,
            DataTypeArg::Type2 => DataType::Type2,
            DataTypeArg::Type3 => DataType::Type3,
            DataTypeArg::Type4 => DataType::Type4,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub transport: TransportArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command to send.
    #[arg(long, short = 'c', value_enum)]
    pub command: CommandArg,
    /// Motor rotation direction.
    #[arg(long, value_enum, default_value = "right-forward")]
    pub direction: DirectionArg,
    /// Motor data type.
    #[arg(long, value_enum, default_value = "type1")]
    pub data_type: DataTypeArg,
    /// Lock the motor.
    #[arg(long)]
    pub lock: bool,
    /// Command values: motor `SPEED,ANGLE` (or `SPEED,SECONDS`), servo `ANGLE,SPEED`.
    #[arg(
        long,
        value_delimiter = ',',
        num_args = 1..=2,
        allow_negative_numbers = true
    )]
    pub values: Vec<f32>,
    /// Use this correlation id instead of a random one.
    #[arg(long)]
    pub id: Option<u16>,
    /// Wait for the controller's acknowledgment or response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the selected transport and start a link over it.
pub fn start_link(
    transport: &TransportArgs,
    link: &LinkArgs,
    dispatcher: Arc<EventDispatcher>,
) -> CliResult<Link> {
    let config = link.link_config()?;
    let tcp_config = TcpConfig {
        read_chunk_size: link.read_chunk_size,
        ..TcpConfig::default()
    };

    let started = if let Some(addr) = &transport.tcp {
        Link::start_with_config(
            TcpTransport::connect_with_config(addr.as_str(), tcp_config),
            dispatcher,
            config,
        )
    } else if let Some(addr) = &transport.listen {
        let listener = TcpTransport::listen_with_config(addr, tcp_config)
            .map_err(|err| transport_error("listen failed", err))?;
        Link::start_with_config(listener, dispatcher, config)
    } else if let Some(path) = &transport.device {
        Link::start_with_config(
            DeviceTransport::open(path)
                .with_baud_rate(link.baud)
                .with_read_chunk_size(link.read_chunk_size),
            dispatcher,
            config,
        )
    } else {
        return Err(CliError::new(
            USAGE,
            "one of --tcp, --listen or --device is required",
        ));
    };

    started.map_err(|err| link_error("link start failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("  ").unwrap_err().code, USAGE);
    }

    #[test]
    fn link_config_from_flags() {
        let args = LinkArgs {
            send_interval: "5ms".to_string(),
            pending_ttl: Some("30s".to_string()),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            baud: DEFAULT_BAUD_RATE,
        };
        let config = args.link_config().unwrap();
        assert_eq!(config.send_interval, Duration::from_millis(5));
        assert_eq!(config.pending_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.read_poll_timeout, LinkConfig::default().read_poll_timeout);
    }

    #[test]
    fn command_args_map_to_kinds() {
        assert_eq!(CommandArg::BothMotor.kind(), CommandKind::BothSteppingMotor);
        assert_eq!(CommandArg::BottomServo.kind(), CommandKind::BottomServoMotor);
    }
}
