//! Logging sinks.
//!
//! Internals log through `tracing`; this module routes those events to
//! the three public sinks — stderr, syslog, and a user callback — each
//! with its own severity threshold. Any combination may be active.

use std::io::Write;
use std::os::unix::net::UnixDatagram;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use ystore_types::LogLevel;

/// A user log callback.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

#[derive(Default)]
struct Sinks {
    stderr: Option<LogLevel>,
    syslog: Option<(LogLevel, Option<UnixDatagram>)>,
    callback: Option<(LogLevel, LogCallback)>,
}

static SINKS: OnceLock<Mutex<Sinks>> = OnceLock::new();

fn sinks() -> &'static Mutex<Sinks> {
    SINKS.get_or_init(|| Mutex::new(Sinks::default()))
}

/// Route messages at or below `level` to standard error.
/// `LogLevel::None` disables the sink.
pub fn log_stderr(level: LogLevel) {
    install();
    sinks().lock().stderr = (level != LogLevel::None).then_some(level);
}

/// Route messages at or below `level` to syslog (`/dev/log`).
/// `LogLevel::None` disables the sink.
pub fn log_syslog(level: LogLevel) {
    install();
    let socket = (level != LogLevel::None)
        .then(|| {
            let sock = UnixDatagram::unbound().ok()?;
            sock.connect("/dev/log").ok()?;
            Some(sock)
        })
        .flatten();
    sinks().lock().syslog = (level != LogLevel::None).then_some((level, socket));
}

/// Route messages at or below `level` to a callback.
pub fn log_set_callback(level: LogLevel, cb: LogCallback) {
    install();
    sinks().lock().callback = (level != LogLevel::None).then_some((level, cb));
}

/// Install the routing layer as the global subscriber. Idempotent; a
/// subscriber installed by the embedding application wins silently.
fn install() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(SinkLayer)
            .with(LevelFilter::TRACE)
            .try_init();
    });
}

fn to_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Info,
        Level::DEBUG | Level::TRACE => LogLevel::Debug,
    }
}

/// Syslog priority for facility `daemon` (3).
fn syslog_priority(level: LogLevel) -> u8 {
    let severity = match level {
        LogLevel::None | LogLevel::Error => 3,
        LogLevel::Warning => 4,
        LogLevel::Info => 6,
        LogLevel::Debug => 7,
    };
    (3 << 3) | severity
}

struct SinkLayer;

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = to_level(event.metadata().level());
        let guard = sinks().lock();
        let wanted_by_stderr = guard.stderr.is_some_and(|max| level <= max);
        let wanted_by_syslog = guard
            .syslog
            .as_ref()
            .is_some_and(|(max, _)| level <= *max);
        let wanted_by_cb = guard
            .callback
            .as_ref()
            .is_some_and(|(max, _)| level <= *max);
        if !wanted_by_stderr && !wanted_by_syslog && !wanted_by_cb {
            return;
        }

        let mut message = MessageVisitor::default();
        event.record(&mut message);
        let line = format!("[{level}] {}: {}", event.metadata().target(), message.0);

        if wanted_by_stderr {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{line}");
        }
        if let Some((max, Some(sock))) = &guard.syslog {
            if level <= *max {
                let framed = format!("<{}>yangstore: {}", syslog_priority(level), message.0);
                let _ = sock.send(framed.as_bytes());
            }
        }
        if let Some((max, cb)) = &guard.callback {
            if level <= *max {
                cb(level, &line);
            }
        }
    }
}

/// Collects event fields into one human-readable string.
#[derive(Default)]
struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if !self.0.is_empty() {
            self.0.push(' ');
        }
        if field.name() == "message" {
            self.0.push_str(&format!("{value:?}"));
        } else {
            self.0.push_str(&format!("{}={value:?}", field.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callback_sink_receives_filtered_events() {
        // Other tests in this process may log concurrently; count only
        // events carrying this test's marker.
        const MARKER: &str = "log-sink-test-event";
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        log_set_callback(
            LogLevel::Warning,
            Arc::new(move |level, msg| {
                if msg.contains(MARKER) {
                    assert!(level <= LogLevel::Warning);
                    hits2.fetch_add(1, Ordering::Relaxed);
                }
            }),
        );
        tracing::warn!("{MARKER} visible");
        tracing::debug!("{MARKER} below the threshold");
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        // Disable and confirm silence.
        log_set_callback(LogLevel::None, Arc::new(|_, _| {}));
        tracing::warn!("{MARKER} after disable");
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn level_mapping() {
        assert_eq!(to_level(&Level::ERROR), LogLevel::Error);
        assert_eq!(to_level(&Level::WARN), LogLevel::Warning);
        assert_eq!(to_level(&Level::INFO), LogLevel::Info);
        assert_eq!(to_level(&Level::TRACE), LogLevel::Debug);
    }

    #[test]
    fn syslog_priorities() {
        assert_eq!(syslog_priority(LogLevel::Error), 27);
        assert_eq!(syslog_priority(LogLevel::Warning), 28);
        assert_eq!(syslog_priority(LogLevel::Info), 30);
        assert_eq!(syslog_priority(LogLevel::Debug), 31);
    }
}
