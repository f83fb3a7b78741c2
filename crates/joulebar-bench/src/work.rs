use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use joulebar_core::execution::{ExecutionEvent, ExecutionPhase, WorkHandle};
use tokio::process::Command;
use tokio::sync::broadcast;

use crate::error::BenchError;

/// Something a benchmark can execute and wait for.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    fn label(&self) -> &str;

    /// Execute once and resolve when the work has finished.
    async fn run_to_completion(&self) -> Result<(), BenchError>;
}

/// Broadcast feed of execution started/finished events.
///
/// Cloning shares the channel. Events sent while nobody is subscribed are
/// dropped.
#[derive(Debug, Clone)]
pub struct ExecutionSignals {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl Default for ExecutionSignals {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ExecutionSignals {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        // No receivers is fine: nobody is watching activity right now.
        let _ = self.tx.send(event);
    }

    pub fn started(&self, handle: WorkHandle) {
        self.emit(ExecutionEvent::started(handle));
    }

    pub fn finished(&self, handle: WorkHandle) {
        self.emit(ExecutionEvent::finished(handle));
    }
}

/// Runs a child process; completion is process exit.
#[derive(Debug)]
pub struct CommandWorkUnit {
    label: String,
    program: String,
    args: Vec<String>,
    signals: Option<ExecutionSignals>,
    runs: AtomicU64,
}

impl CommandWorkUnit {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            label,
            program,
            args,
            signals: None,
            runs: AtomicU64::new(0),
        }
    }

    /// Split a command line on whitespace. No shell quoting is interpreted.
    pub fn parse(command_line: &str) -> Result<Self, BenchError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| BenchError::InvalidCommand(command_line.to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Report each run's start and finish on `signals`.
    pub fn with_signals(mut self, signals: ExecutionSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    fn next_handle(&self) -> WorkHandle {
        let n = self.runs.fetch_add(1, Ordering::Relaxed);
        WorkHandle::new(format!("{}#{n}", self.program))
    }
}

#[async_trait]
impl WorkUnit for CommandWorkUnit {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run_to_completion(&self) -> Result<(), BenchError> {
        let handle = self.next_handle();
        if let Some(signals) = &self.signals {
            signals.started(handle.clone());
        }

        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        if let Some(signals) = &self.signals {
            signals.finished(handle);
        }

        let status = status.map_err(|source| BenchError::Spawn {
            label: self.label.clone(),
            source,
        })?;
        if !status.success() {
            return Err(BenchError::WorkFailed {
                label: self.label.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Work executed elsewhere: `trigger` starts it and returns its handle, and
/// completion is the matching `Finished` event on `signals`.
pub struct SignaledWorkUnit<F> {
    label: String,
    signals: ExecutionSignals,
    trigger: F,
}

impl<F> SignaledWorkUnit<F>
where
    F: Fn() -> WorkHandle + Send + Sync,
{
    pub fn new(label: impl Into<String>, signals: ExecutionSignals, trigger: F) -> Self {
        Self {
            label: label.into(),
            signals,
            trigger,
        }
    }
}

#[async_trait]
impl<F> WorkUnit for SignaledWorkUnit<F>
where
    F: Fn() -> WorkHandle + Send + Sync,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn run_to_completion(&self) -> Result<(), BenchError> {
        // Subscribe first so a fast finish cannot slip past.
        let mut rx = self.signals.subscribe();
        let handle = (self.trigger)();
        loop {
            match rx.recv().await {
                Ok(event) if event.handle == handle && event.phase == ExecutionPhase::Finished => {
                    return Ok(());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(label = %self.label, skipped, "execution signals lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BenchError::SignalsClosed {
                        label: self.label.clone(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_splits_program_and_args() {
        let unit = CommandWorkUnit::parse("  sleep   0.1 ").unwrap();
        assert_eq!(unit.label(), "sleep 0.1");
        assert_eq!(unit.args, vec!["0.1".to_string()]);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandWorkUnit::parse("   "),
            Err(BenchError::InvalidCommand(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_success_and_failure() {
        assert!(CommandWorkUnit::parse("true").unwrap().run_to_completion().await.is_ok());
        assert!(matches!(
            CommandWorkUnit::parse("false").unwrap().run_to_completion().await,
            Err(BenchError::WorkFailed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let unit = CommandWorkUnit::parse("joulebar-no-such-program-here").unwrap();
        assert!(matches!(
            unit.run_to_completion().await,
            Err(BenchError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_reports_start_and_finish() {
        let signals = ExecutionSignals::default();
        let mut rx = signals.subscribe();
        let unit = CommandWorkUnit::parse("true").unwrap().with_signals(signals);
        unit.run_to_completion().await.unwrap();

        let started = rx.recv().await.unwrap();
        let finished = rx.recv().await.unwrap();
        assert_eq!(started.phase, ExecutionPhase::Started);
        assert_eq!(finished.phase, ExecutionPhase::Finished);
        assert_eq!(started.handle, finished.handle);
    }

    #[tokio::test]
    async fn signaled_unit_waits_for_its_own_finish() {
        let signals = ExecutionSignals::default();
        let remote = signals.clone();
        let unit = SignaledWorkUnit::new("cell", signals, move || {
            let remote = remote.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                remote.finished(WorkHandle::new("other"));
                remote.started(WorkHandle::new("cell-7"));
                remote.finished(WorkHandle::new("cell-7"));
            });
            WorkHandle::new("cell-7")
        });

        tokio::time::timeout(Duration::from_secs(2), unit.run_to_completion())
            .await
            .unwrap()
            .unwrap();
    }
}
