//! Runtime configuration.
//!
//! [`ProxyConfig`] is built once from [`RunArgs`] during startup and is
//! read-only afterwards. It is shared through `AppState` without any
//! locking. Validation of user-supplied values lives in [`validation`].

pub mod validation;

use std::net::SocketAddr;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::error::TracehopError;
use crate::proxy::target::TargetBase;

/// Whether requests are relayed upstream or only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    #[default]
    Forward,
    RecordOnly,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    pub target: Option<TargetBase>,
    pub mode: ForwardMode,
    pub upstream_timeout: Option<Duration>,
    pub body_idle_timeout: Option<Duration>,
    pub record_limit: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            target: None,
            mode: ForwardMode::Forward,
            upstream_timeout: None,
            body_idle_timeout: None,
            record_limit: 64 * 1024,
        }
    }
}

impl ProxyConfig {
    pub fn from_args(args: &RunArgs) -> Result<Self, TracehopError> {
        let listen: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
        let target = args
            .target
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(validation::validate_target)
            .transpose()?;

        Ok(Self {
            listen,
            target,
            mode: if args.record_only {
                ForwardMode::RecordOnly
            } else {
                ForwardMode::Forward
            },
            upstream_timeout: args.timeout.map(Duration::from_millis),
            body_idle_timeout: args.body_idle_timeout.map(Duration::from_millis),
            record_limit: args.record_limit,
        })
    }
}
