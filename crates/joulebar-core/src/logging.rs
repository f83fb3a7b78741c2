use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Prefix of the daily rolling log files.
pub const LOG_FILE_PREFIX: &str = "joulebar.log";
pub const LOG_FILTER_ENV: &str = "JOULEBAR_LOG";
pub const LOG_DIR_ENV: &str = "JOULEBAR_LOG_DIR";

const DEFAULT_RING_LINES: usize = 500;
const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// One formatted event kept for the on-screen log strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub target: String,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {}", self.level.as_str(), self.text)
    }
}

/// Bounded, shareable buffer of recent log lines.
#[derive(Debug, Clone)]
pub struct LogRing {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: LogLine) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            while lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// The newest `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        match self.lines.lock() {
            Ok(lines) => {
                let skip = lines.len().saturating_sub(n);
                lines.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_LINES)
    }
}

/// Keeps the file writer flushing; hold it for the life of the process.
pub struct LogHandle {
    pub ring: LogRing,
    pub dir: PathBuf,
    _guard: WorkerGuard,
}

/// Where logs go and how much is kept.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub dir: PathBuf,
    /// Used when neither `JOULEBAR_LOG` nor `RUST_LOG` is set.
    pub default_filter: String,
    pub ring_lines: usize,
    /// Write the file log as JSON lines instead of plain text.
    pub json: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: log_dir(),
            default_filter: "info".into(),
            ring_lines: DEFAULT_RING_LINES,
            json: false,
        }
    }
}

/// Directory for log files.
///
/// `JOULEBAR_LOG_DIR` wins; otherwise the platform data directory, then a
/// relative `logs/`.
pub fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("joulebar").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Delete rolled log files last modified before `now - max_age`.
///
/// Returns how many files were removed.
fn prune_logs(dir: &Path, max_age: Duration) -> usize {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified <= cutoff)
                .unwrap_or(false)
        })
        .filter(|e| std::fs::remove_file(e.path()).is_ok())
        .count()
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default))
}

struct RingLayer {
    ring: LogRing,
}

impl<S: tracing::Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldText::default();
        event.record(&mut fields);
        self.ring.push(LogLine {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            text: fields.into_text(),
        });
    }
}

/// Renders `message` first, then `key=value` pairs.
#[derive(Default)]
struct FieldText {
    message: String,
    extra: String,
}

impl FieldText {
    fn into_text(self) -> String {
        match (self.message.is_empty(), self.extra.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.extra,
            (false, false) => format!("{} {}", self.message, self.extra),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.extra.is_empty() {
            self.extra.push(' ');
        }
        let _ = write!(self.extra, "{name}={value}");
    }
}

impl tracing::field::Visit for FieldText {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Install the global subscriber: a daily rolling file plus the in-memory
/// ring the dashboard renders.
pub fn init(opts: LoggingOptions) -> Result<LogHandle, LoggingError> {
    std::fs::create_dir_all(&opts.dir).map_err(|source| LoggingError::CreateDir {
        path: opts.dir.clone(),
        source,
    })?;
    let pruned = prune_logs(&opts.dir, RETENTION);

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&opts.dir, LOG_FILE_PREFIX));
    let file_layer = if opts.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed()
    };

    let ring = LogRing::new(opts.ring_lines);
    tracing_subscriber::registry()
        .with(env_filter(&opts.default_filter))
        .with(file_layer)
        .with(RingLayer { ring: ring.clone() })
        .try_init()?;

    tracing::debug!(dir = %opts.dir.display(), pruned, "logging initialized");
    Ok(LogHandle {
        ring,
        dir: opts.dir,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    fn line(text: &str) -> LogLine {
        LogLine {
            level: Level::INFO,
            target: "joulebar_core::test".into(),
            text: text.into(),
        }
    }

    #[test]
    fn log_dir_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        let previous = std::env::var_os(LOG_DIR_ENV);
        unsafe { std::env::set_var(LOG_DIR_ENV, "/tmp/joulebar-log-test") };
        assert_eq!(log_dir(), PathBuf::from("/tmp/joulebar-log-test"));
        match previous {
            Some(v) => unsafe { std::env::set_var(LOG_DIR_ENV, v) },
            None => unsafe { std::env::remove_var(LOG_DIR_ENV) },
        }
    }

    #[test]
    fn ring_drops_oldest_past_capacity() {
        let ring = LogRing::new(2);
        for i in 0..4 {
            ring.push(line(&format!("event {i}")));
        }
        let texts: Vec<_> = ring.recent(10).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["event 2", "event 3"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let ring = LogRing::new(5);
        for i in 0..5 {
            ring.push(line(&i.to_string()));
        }
        let texts: Vec<_> = ring.recent(2).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["3", "4"]);
    }

    #[test]
    fn zero_capacity_ring_stays_empty() {
        let ring = LogRing::new(0);
        ring.push(line("ignored"));
        assert!(ring.is_empty());
    }

    #[test]
    fn line_display_includes_level() {
        assert_eq!(line("poll ok").to_string(), " INFO poll ok");
    }

    #[test]
    fn field_text_layouts() {
        let mut f = FieldText::default();
        f.message = "fetch failed".into();
        f.push_field("status", format_args!("{}", 503));
        assert_eq!(f.into_text(), "fetch failed status=503");

        let mut f = FieldText::default();
        f.push_field("a", format_args!("1"));
        f.push_field("b", format_args!("2"));
        assert_eq!(f.into_text(), "a=1 b=2");

        assert_eq!(FieldText::default().into_text(), "");
    }

    #[test]
    fn ring_layer_captures_events() {
        let ring = LogRing::new(8);
        let subscriber = tracing_subscriber::registry().with(RingLayer { ring: ring.clone() });
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(source = "all", "rate unavailable");
        });
        let lines = ring.recent(8);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, Level::WARN);
        assert_eq!(lines[0].text, "rate unavailable source=all");
    }

    #[test]
    fn prune_only_touches_rolled_logs() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(format!("{LOG_FILE_PREFIX}.2025-01-01"));
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&stale, "x").unwrap();
        std::fs::write(&unrelated, "y").unwrap();

        assert_eq!(prune_logs(dir.path(), Duration::ZERO), 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn prune_keeps_fresh_logs() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join(format!("{LOG_FILE_PREFIX}.today"));
        std::fs::write(&fresh, "x").unwrap();
        assert_eq!(prune_logs(dir.path(), RETENTION), 0);
        assert!(fresh.exists());
    }
}
