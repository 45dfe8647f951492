//! Startup configuration.
//!
//! Every option can be given as a command-line flag or through the
//! environment; flags win. [`Args`] holds the raw values as clap parsed them,
//! [`Config`] is the validated, immutable result that the rest of the bridge
//! reads. Validation happens exactly once, before anything else starts.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::Level;

pub const DEFAULT_SERVICE_NAME: &str = "ml-metrics-bridge";
pub const DEFAULT_METRICS_FILE: &str = "/shared/metrics/current.json";
pub const DEFAULT_COLLECTION_INTERVAL: &str = "10";

/// OTLP/HTTP path appended when the endpoint has none.
const OTLP_METRICS_PATH: &str = "/v1/metrics";

/// The only OTLP protocol this bridge speaks.
pub const SUPPORTED_PROTOCOL: &str = "http/protobuf";

/// Well-known OTLP/gRPC port. An HTTP exporter pointed at it delivers nothing.
const OTLP_GRPC_PORT: u16 = 4317;

/// Lower bound for the exporter's push period.
const MIN_EXPORT_INTERVAL_MS: u64 = 100;

/// Training metrics to OpenTelemetry bridge.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "metrics-bridge",
    about = "Forwards training progress snapshots to an OpenTelemetry collector",
    version
)]
pub struct Args {
    /// Collector address, `host:port` or `http(s)://host:port[/path]`.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// OTLP protocol. Only `http/protobuf` is supported.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_PROTOCOL", default_value = SUPPORTED_PROTOCOL)]
    pub protocol: String,

    /// Service name reported as the `service.name` resource attribute.
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Snapshot file written by the training workload.
    #[arg(long = "metrics-file", env = "METRICS_FILE_PATH", default_value = DEFAULT_METRICS_FILE)]
    pub metrics_file_path: String,

    /// Polling interval in seconds (minimum 1).
    #[arg(
        long = "interval",
        env = "COLLECTION_INTERVAL",
        default_value = DEFAULT_COLLECTION_INTERVAL,
        allow_hyphen_values = true
    )]
    pub collection_interval: String,

    /// Log verbosity.
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Period of the background OTLP push, in milliseconds.
    #[arg(long, env = "OTEL_METRIC_EXPORT_INTERVAL", default_value = "5000")]
    pub export_interval_ms: u64,

    /// Upper bound for the final flush on shutdown, in seconds.
    #[arg(long = "flush-timeout", env = "SHUTDOWN_FLUSH_TIMEOUT", default_value = "5")]
    pub flush_timeout_seconds: u64,
}

/// Enumerated log levels accepted by `LOG_LEVEL`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Maps to the closest tracing level. `critical` has no tracing
    /// counterpart and collapses into `error`.
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Critical => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Configuration failures. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No collector endpoint was configured.
    MissingEndpoint,
    /// The endpoint could not be understood as `[scheme://]host:port[/path]`.
    InvalidEndpoint { value: String, reason: String },
    /// OTLP protocol other than `http/protobuf`.
    UnsupportedProtocol(String),
    /// Collection interval is not an integer >= 1.
    InvalidInterval(String),
    /// A required string setting is empty.
    EmptyValue(&'static str),
    /// Export interval below the supported minimum.
    InvalidExportInterval(u64),
    /// Flush timeout of zero.
    InvalidFlushTimeout(u64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEndpoint => {
                write!(f, "collector endpoint is required (OTEL_EXPORTER_OTLP_ENDPOINT)")
            }
            ConfigError::InvalidEndpoint { value, reason } => {
                write!(f, "invalid collector endpoint '{}': {}", value, reason)
            }
            ConfigError::UnsupportedProtocol(raw) => write!(
                f,
                "unsupported OTLP protocol '{}': only {} is available",
                raw, SUPPORTED_PROTOCOL
            ),
            ConfigError::InvalidInterval(raw) => write!(
                f,
                "invalid collection interval '{}': expected a whole number of seconds >= 1",
                raw
            ),
            ConfigError::EmptyValue(name) => write!(f, "{} must not be empty", name),
            ConfigError::InvalidExportInterval(ms) => write!(
                f,
                "export interval {}ms is below the minimum of {}ms",
                ms, MIN_EXPORT_INTERVAL_MS
            ),
            ConfigError::InvalidFlushTimeout(secs) => {
                write!(f, "flush timeout must be at least 1s, got {}s", secs)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validated bridge configuration. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Normalized OTLP/HTTP metrics URL.
    pub endpoint: String,
    pub service_name: String,
    pub metrics_file_path: PathBuf,
    pub collection_interval: Duration,
    pub log_level: LogLevel,
    pub export_interval: Duration,
    pub flush_timeout: Duration,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let protocol = args.protocol.trim().to_ascii_lowercase();
        if protocol != SUPPORTED_PROTOCOL {
            return Err(ConfigError::UnsupportedProtocol(args.protocol));
        }

        let endpoint = match args.endpoint.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingEndpoint),
            Some(raw) => normalize_endpoint(raw)?,
        };

        let service_name = args.service_name.trim().to_string();
        if service_name.is_empty() {
            return Err(ConfigError::EmptyValue("service name"));
        }

        let metrics_file = args.metrics_file_path.trim();
        if metrics_file.is_empty() {
            return Err(ConfigError::EmptyValue("metrics file path"));
        }

        let collection_interval = parse_interval(&args.collection_interval)?;

        if args.export_interval_ms < MIN_EXPORT_INTERVAL_MS {
            return Err(ConfigError::InvalidExportInterval(args.export_interval_ms));
        }
        if args.flush_timeout_seconds == 0 {
            return Err(ConfigError::InvalidFlushTimeout(args.flush_timeout_seconds));
        }

        Ok(Self {
            endpoint,
            service_name,
            metrics_file_path: PathBuf::from(metrics_file),
            collection_interval,
            log_level: args.log_level,
            export_interval: Duration::from_millis(args.export_interval_ms),
            flush_timeout: Duration::from_secs(args.flush_timeout_seconds),
        })
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "endpoint={}, service={}, file={}, interval={}s, export_interval={}ms, flush_timeout={}s, log_level={}",
            self.endpoint,
            self.service_name,
            self.metrics_file_path.display(),
            self.collection_interval.as_secs(),
            self.export_interval.as_millis(),
            self.flush_timeout.as_secs(),
            self.log_level
        )
    }
}

/// Parses the polling interval. Zero, negatives and non-integers are rejected.
fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(raw.to_string());
    let secs: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if secs < 1 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs as u64))
}

/// Turns `host:port` or `scheme://host:port[/path]` into a full OTLP/HTTP URL.
fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("http".to_string(), raw),
    };
    if scheme != "http" && scheme != "https" {
        return Err(invalid("scheme must be http or https"));
    }

    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("unterminated IPv6 address"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port"))?;
        (host, port)
    } else {
        authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?
    };

    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(invalid("missing or malformed host"));
    }
    let port = match port.parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => return Err(invalid("port must be between 1 and 65535")),
    };
    // An explicit path means the caller knows the port serves OTLP/HTTP.
    if port == OTLP_GRPC_PORT && (path.is_empty() || path == "/") {
        return Err(invalid(
            "port 4317 is the OTLP/gRPC port; point the bridge at the OTLP/HTTP receiver (usually 4318)",
        ));
    }

    let path = if path.is_empty() || path == "/" {
        OTLP_METRICS_PATH
    } else {
        path
    };

    Ok(format!("{}://{}{}", scheme, authority, path))
}
