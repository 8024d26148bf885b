//! Structured Logging
//!
//! Tracing setup and the structured events the context layer emits: request
//! spans, handler outcomes, lifecycle hooks.

use {
    crate::context::Context,
    std::time::Duration,
    tracing::{debug, error, info, span, Level, Span},
    tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter},
};

/// Initialize the tracing subscriber with appropriate configuration
pub fn init_tracing() {
    // Try to get log level from environment, default to info
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("solidctx=info"));

    // Check if JSON format is requested
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a host application may already have installed a subscriber
    let installed = if json_format {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!("Tracing initialized");
    }
}

/// Create a span for tracking a request that was given a context
pub fn request_span(context: &Context) -> Span {
    let progress_token = context.scope().progress_token().map(|t| t.to_string());
    span!(
        Level::INFO,
        "mcp_request",
        request_id = %context.request_id(),
        progress_token = progress_token.as_deref(),
        server = %context.identity().name,
    )
}

/// Span for a handler invocation that runs without a context
pub fn handler_span(handler: &str) -> Span {
    span!(Level::DEBUG, "mcp_handler", handler = %handler)
}

/// Log handler events
pub fn log_handler_start(handler: &str, with_context: bool) {
    debug!(
        handler = %handler,
        with_context = with_context,
        event = "handler_start",
        "Invoking handler"
    );
}

pub fn log_handler_success(handler: &str, duration: Duration) {
    debug!(
        handler = %handler,
        duration_ms = duration.as_millis(),
        event = "handler_success",
        "Handler completed"
    );
}

pub fn log_handler_error(handler: &str, error: &anyhow::Error, duration: Duration) {
    error!(
        handler = %handler,
        error = %error,
        duration_ms = duration.as_millis(),
        event = "handler_error",
        "Handler failed"
    );
}

/// Lifecycle hook logging
pub fn log_hook_failure(phase: &str, error: &anyhow::Error) {
    error!(
        phase = %phase,
        error = %error,
        event = "lifespan_hook_failed",
        "Lifespan hook failed, continuing"
    );
}

pub fn log_lifespan_started(entries: usize) {
    info!(
        entries = entries,
        event = "lifespan_started",
        "Lifespan state ready"
    );
}

pub fn log_lifespan_stopped() {
    info!(event = "lifespan_stopped", "Lifespan state released");
}
