//! `tracehop run` — start the proxy server.
//!
//! Validates the configuration, initialises logging, builds the shared
//! state, binds the listener and serves until Ctrl+C / SIGTERM. Binding
//! is the only runtime step whose failure ends the process.

use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::{ForwardMode, ProxyConfig};
use crate::error::TracehopError;
use crate::logging;
use crate::proxy::recorder::StdoutSink;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), TracehopError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = ProxyConfig::from_args(&args)?;
    let addr = config.listen;
    let target = config
        .target
        .as_ref()
        .map_or_else(|| "(per request)".to_string(), ToString::to_string);
    let record_only = config.mode == ForwardMode::RecordOnly;

    let state = Arc::new(AppState::new(config, Arc::new(StdoutSink)));

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "failed to bind listener");
        e
    })?;

    tracing::info!(
        addr = %addr,
        target = %target,
        record_only,
        "tracehop started"
    );

    server::serve(listener, state, server::shutdown_signal()).await?;

    tracing::info!("tracehop stopped");
    Ok(())
}
