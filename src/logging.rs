//! Tracing subscriber setup for terminal and file output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use std::path::Path;

/// Longest `message` field printed before it is cut with an ellipsis.
const MAX_MESSAGE_CHARS: usize = 280;

/// Backend and store errors can carry whole response bodies.
const MAX_ERROR_CHARS: usize = 200;

/// Dependencies that are chatty at debug level.
const QUIET_TARGETS: &[&str] = &["serenity=info", "hyper_util=info", "reqwest=info", "rustls=info", "h2=info"];

/// Render one event field, cutting long `message` and `error` values.
fn render_field(name: &str, value: &str) -> String {
    let limit = match name {
        "message" => MAX_MESSAGE_CHARS,
        "error" => MAX_ERROR_CHARS,
        _ => return format!("{name}={value}"),
    };
    match value.char_indices().nth(limit) {
        Some((cut, _)) => format!("{name}={}...", &value[..cut]),
        None => format!("{name}={value}"),
    }
}

/// Initialize tracing. Logs go to the terminal, and additionally to a
/// daily-rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop, so the caller must
/// hold it for the process lifetime.
pub fn init_tracing(debug: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let field_formatter = || {
        format::debug_fn(|writer, field, value| {
            write!(writer, "{}", render_field(field.name(), &format!("{value:?}")))
        })
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .fmt_fields(field_formatter())
        .compact();

    match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir).map_err(|error| {
                anyhow::anyhow!("failed to create log directory {}: {error}", log_dir.display())
            })?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "ragbot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .fmt_fields(field_formatter())
                .compact()
                .boxed();

            tracing_subscriber::registry()
                .with(build_env_filter(debug))
                .with(terminal_layer)
                .with(file_layer)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(build_env_filter(debug))
                .with(terminal_layer)
                .try_init()?;
            Ok(None)
        }
    }
}

/// `RUST_LOG` wins when set. Otherwise `info`, or `debug` for this crate
/// with the gateway and HTTP stacks held at `info`.
fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directives(debug)))
}

fn default_directives(debug: bool) -> String {
    if debug {
        std::iter::once("debug").chain(QUIET_TARGETS.iter().copied()).collect::<Vec<_>>().join(",")
    } else {
        "info".to_string()
    }
}
