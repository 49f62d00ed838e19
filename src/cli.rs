//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum and
//! [`RunArgs`]. Every flag has an environment variable equivalent for
//! container deployments.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "tracehop",
    version,
    about = "Transparent HTTP forwarding proxy with request/response transcripts",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        tracehop run                                  Forward proxy on :8080\n  \
        tracehop run -t http://localhost:9000         Forward everything to one upstream\n  \
        tracehop run --record-only                    Log requests without forwarding"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),
}

#[derive(Args, Debug, Clone)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        tracehop run -p 3128                              Listen on port 3128\n  \
        tracehop run -t https://api.example.com --pretty  Transparent mode, local dev\n  \
        curl -x http://localhost:8080 http://example.com/  Use as an HTTP proxy")]
pub struct RunArgs {
    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Target URL; when set every request is forwarded to this base URL
    #[arg(short, long, env = "TARGET_URL")]
    pub target: Option<String>,

    /// Record requests only, never forward them
    #[arg(long)]
    pub record_only: bool,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Upstream response timeout in milliseconds (unbounded when unset)
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", help_heading = "Tuning")]
    pub timeout: Option<u64>,

    /// Max wait for each upstream body chunk in milliseconds (unbounded when unset)
    #[arg(long, env = "BODY_IDLE_TIMEOUT_MS", help_heading = "Tuning")]
    pub body_idle_timeout: Option<u64>,

    /// Max body bytes captured into a transcript
    #[arg(
        long,
        env = "RECORD_LIMIT",
        default_value_t = 65_536,
        help_heading = "Tuning"
    )]
    pub record_limit: usize,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Some(Commands::Run(args)) => *args,
            None => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn run_defaults() {
        let args = parse(&["tracehop", "run"]);
        assert!(!args.record_only);
        assert!(!args.pretty);
        assert!(!args.json);
    }

    #[test]
    fn run_accepts_short_flags() {
        let args = parse(&["tracehop", "run", "-p", "3128", "-t", "http://upstream.test"]);
        assert_eq!(args.port, 3128);
        assert_eq!(args.target.as_deref(), Some("http://upstream.test"));
    }

    #[test]
    fn pretty_and_json_conflict() {
        assert!(Cli::try_parse_from(["tracehop", "run", "--pretty", "--json"]).is_err());
    }
}
