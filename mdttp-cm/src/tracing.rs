//! Provide tracing, tailored to this program.
//!
//! At startup, the program should call [`init_stdout`] to install a tracing
//! subscriber (i.e., something that emits events to a log). The verbosity
//! given on the command line selects the default level; `RUST_LOG` still
//! overrides it for finer control.
//!
//! The rest of program the can include `use tracing::prelude::*` for convenient
//! access to the `trace!()`, `debug!()`, `info!()`, `warn!()`, and `error!()`
//! macros.

use std::fmt;
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{DefaultFields, Writer as FmtWriter},
        time::FormatTime,
    },
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Map the command-line verbosity (0..=4) to a default level filter.
///
/// Level 1 is the normal interactive level. Levels 3 and 4 both enable
/// TRACE, which includes every byte of MCU traffic.
pub fn verbosity_to_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Initialize logging to stdout.
///
/// Events are filtered according to the environment variable RUST_LOG,
/// falling back to the level derived from `verbosity`.
pub fn init_stdout(verbosity: u8) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_to_level(verbosity).into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_target(true)
                .fmt_fields(DefaultFields::new())
                .event_format(CustomFormatter),
        )
        .init();
}

/// Custom event formatter that strips crate prefix, colors the level,
/// and displays fields on a second line for readability.
struct CustomFormatter;

/// Visitor that collects fields into a string buffer.
struct FieldCollector {
    fields: Vec<(String, String)>,
    message: Option<String>,
}

impl FieldCollector {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            message: None,
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            let formatted = format!("{:?}", value);
            // Some("foo") -> foo
            let cleaned = if let Some(inner) = formatted.strip_prefix("Some(") {
                inner.strip_suffix(')').unwrap_or(inner).to_string()
            } else {
                formatted
            };
            self.fields.push((field.name().to_string(), cleaned));
        }
    }
}

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: FmtWriter<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldCollector::new();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;
        write!(writer, " ")?;

        let level = *event.metadata().level();
        let (level_color, level_text) = match level {
            Level::ERROR => ("\x1b[31m", "ERROR"), // Red
            Level::WARN => ("\x1b[33m", "WARN "),  // Yellow
            Level::INFO => ("\x1b[32m", "INFO "),  // Green
            Level::DEBUG => ("\x1b[34m", "DEBUG"), // Blue
            Level::TRACE => ("\x1b[35m", "TRACE"), // Magenta
        };
        write!(writer, "{}{}\x1b[0m ", level_color, level_text)?;

        // Strip "mdttp_cm::" from our own targets, keep dependency paths
        // (e.g., "mio::poll") as they are.
        let target = event.metadata().target();
        let short_target = target.strip_prefix("mdttp_cm::").unwrap_or(target);
        write!(writer, "{}: ", short_target)?;

        if let Some(ref msg) = visitor.message {
            write!(writer, "{}", msg.trim_matches('"'))?;
        }

        if !visitor.fields.is_empty() {
            writeln!(writer)?;
            // Timestamp (8 chars) + space + level (5 chars) + space = 15
            write!(writer, "\x1b[90m               ")?;
            for (i, (key, value)) in visitor.fields.iter().enumerate() {
                if i > 0 {
                    write!(writer, ", ")?;
                }
                write!(writer, "{}={}", key, value.trim_matches('"'))?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

// Timestamps in local time, to the nearest second. The default timer is UTC
// and prints a long, ugly string.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut FmtWriter<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "{}", stamp)
    }
}
