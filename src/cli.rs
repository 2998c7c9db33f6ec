use clap::Parser;
use cookie_baker::WorkerConfig;
use std::net::IpAddr;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "cookie-baker-worker",
    version,
    about = "Bakes spotlight cookies for a host process over UDP"
)]
pub struct Cli {
    /// Port the worker listens on for job-control messages (also `-inputPort`).
    #[arg(long, env = "COOKIE_BAKER_INPUT_PORT", value_name = "PORT")]
    pub input_port: Option<String>,

    /// Port the host listens on for progress and completion messages (also `-outputPort`).
    #[arg(long, env = "COOKIE_BAKER_OUTPUT_PORT", value_name = "PORT")]
    pub output_port: Option<String>,

    /// Address of the host process.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1")]
    pub remote_host: IpAddr,

    /// Seed for the sub-pixel jitter stream.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Flags the worker understands, with the spelling clap expects.
const VALUE_FLAGS: &[(&str, &str)] = &[
    ("-inputPort", "--input-port"),
    ("--input-port", "--input-port"),
    ("-outputPort", "--output-port"),
    ("--output-port", "--output-port"),
    ("--remote-host", "--remote-host"),
    ("--seed", "--seed"),
];

const SWITCHES: &[&str] = &["-h", "--help", "-V", "--version"];

pub fn parse() -> Cli {
    let args = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
    Cli::parse_from(normalize_args(args))
}

/// Rewrites the host's `-inputPort N -outputPort N` spelling to the long
/// flags and drops every argument the worker does not know, such as the
/// engine flags a launcher adds. A repeated flag keeps its last value.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut normalized: Vec<String> = args.next().into_iter().collect();
    let mut values: Vec<(&'static str, String)> = Vec::new();

    while let Some(arg) = args.next() {
        if SWITCHES.contains(&arg.as_str()) {
            normalized.push(arg);
            continue;
        }

        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let Some(&(_, long)) = VALUE_FLAGS.iter().find(|(spelling, _)| *spelling == flag) else {
            log::debug!("Ignoring unknown argument {:?}", arg);
            continue;
        };

        let value = match inline_value {
            Some(value) => Some(value),
            None => args.next_if(|next| !is_known_flag(next)),
        };
        let Some(value) = value else {
            log::debug!("No value after {}", flag);
            continue;
        };

        values.retain(|(existing, _)| *existing != long);
        values.push((long, value));
    }

    normalized.extend(
        values
            .into_iter()
            .map(|(long, value)| format!("{}={}", long, value)),
    );
    normalized
}

fn is_known_flag(arg: &str) -> bool {
    let flag = arg.split_once('=').map_or(arg, |(flag, _)| flag);
    SWITCHES.contains(&flag) || VALUE_FLAGS.iter().any(|(spelling, _)| *spelling == flag)
}

/// A port that is absent or does not parse counts as missing.
fn parse_port(value: Option<&str>) -> Option<u16> {
    value.and_then(|value| value.trim().parse().ok())
}

/// Startup failures, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    MissingBothPorts,
    MissingInputPort,
    MissingOutputPort,
}

impl StartupError {
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }

    pub fn code(self) -> u8 {
        match self {
            Self::MissingBothPorts => 255,
            Self::MissingInputPort => 254,
            Self::MissingOutputPort => 253,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::MissingBothPorts => "no usable input or output port given",
            Self::MissingInputPort => "no usable input port given",
            Self::MissingOutputPort => "no usable output port given",
        }
    }
}

impl Cli {
    pub fn worker_config(&self) -> Result<WorkerConfig, StartupError> {
        let input_port = parse_port(self.input_port.as_deref());
        let output_port = parse_port(self.output_port.as_deref());

        let (input_port, output_port) = match (input_port, output_port) {
            (Some(input), Some(output)) => (input, output),
            (None, None) => return Err(StartupError::MissingBothPorts),
            (None, Some(_)) => return Err(StartupError::MissingInputPort),
            (Some(_), None) => return Err(StartupError::MissingOutputPort),
        };

        Ok(WorkerConfig::new(input_port, output_port)
            .remote_host(self.remote_host)
            .seed(self.seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let args = std::iter::once("cookie-baker-worker")
            .chain(args.iter().copied())
            .map(String::from);
        Cli::try_parse_from(normalize_args(args)).unwrap()
    }

    fn exit_code(args: &[&str]) -> u8 {
        parse(args).worker_config().unwrap_err().code()
    }

    #[test]
    fn test_long_flags() {
        let config = parse(&["--input-port", "7000", "--output-port", "7001", "--seed", "9"])
            .worker_config()
            .unwrap();
        assert_eq!(config.input_port, 7000);
        assert_eq!(config.output_port, 7001);
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn test_host_spelling() {
        let config = parse(&["-inputPort", "7000", "-outputPort", "7001"])
            .worker_config()
            .unwrap();
        assert_eq!(config.input_port, 7000);
        assert_eq!(config.output_port, 7001);
    }

    #[test]
    fn test_unknown_arguments_are_ignored() {
        let config = parse(&[
            "-batchmode",
            "-nographics",
            "-logFile",
            "worker.log",
            "--input-port=1",
            "-outputPort",
            "2",
        ])
        .worker_config()
        .unwrap();
        assert_eq!(config.input_port, 1);
        assert_eq!(config.output_port, 2);
    }

    #[test]
    fn test_unparsable_ports_count_as_missing() {
        assert_eq!(exit_code(&["--input-port", "abc", "--output-port", "7001"]), 254);
        assert_eq!(exit_code(&["-inputPort", "7000", "-outputPort", "70000"]), 253);
        assert_eq!(exit_code(&["-inputPort", "x", "-outputPort", "-3"]), 255);
    }

    #[test]
    fn test_missing_ports_have_distinct_codes() {
        assert_eq!(exit_code(&[]), 255);
        assert_eq!(exit_code(&["-outputPort", "1"]), 254);
        assert_eq!(exit_code(&["-inputPort", "1"]), 253);
    }

    #[test]
    fn test_flag_without_value_does_not_swallow_the_next_flag() {
        assert_eq!(exit_code(&["-inputPort", "-outputPort", "5"]), 254);
    }

    #[test]
    fn test_repeated_flag_keeps_last_value() {
        let config = parse(&["-inputPort", "1", "-inputPort", "3", "-outputPort", "2"])
            .worker_config()
            .unwrap();
        assert_eq!(config.input_port, 3);
    }
}
