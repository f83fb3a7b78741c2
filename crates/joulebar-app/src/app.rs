use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use joulebar_bench::{
    BenchError, BenchmarkHarness, BenchmarkReport, BenchmarkTrial, CommandWorkUnit, HarnessState,
    WorkUnit,
};
use joulebar_core::activity::ActivityHistory;
use joulebar_core::error::DashboardError;
use joulebar_core::execution::ExecutionEvent;
use joulebar_core::logging::LogRing;
use joulebar_core::session::{DisplaySession, Rebind};
use joulebar_source::{HttpSource, PollError, PollOutcome, Poller, SkipReason};
use joulebar_ui::dashboard::{render_dashboard, DashboardView};

const LOG_LINES: usize = 6;
const ACTIVITY_TICK: Duration = Duration::from_secs(1);

/// Messages from background tasks to the draw loop.
pub enum AppEvent {
    Polled(PollOutcome),
    BenchFinished(Result<Vec<BenchmarkTrial>, BenchError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToggleUnits,
    ToggleChart,
    Reset,
    Pause,
    Bench,
    Quit,
}

pub fn action_for(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Char('u') => Some(Action::ToggleUnits),
        KeyCode::Char('m') => Some(Action::ToggleChart),
        KeyCode::Char('r') => Some(Action::Reset),
        KeyCode::Char('p') | KeyCode::Char(' ') => Some(Action::Pause),
        KeyCode::Char('b') => Some(Action::Bench),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

/// Short status for the top bar, or `None` to keep the previous one.
pub fn status_for(outcome: &PollOutcome) -> Option<&'static str> {
    match outcome {
        PollOutcome::Updated(_) => Some("ok"),
        PollOutcome::Skipped(SkipReason::InFlight) => None,
        PollOutcome::Skipped(SkipReason::Hidden) => Some("paused"),
        PollOutcome::Failed(PollError::Fetch(_)) => Some("fetch failed"),
        PollOutcome::Failed(PollError::Rejected(DashboardError::CounterRegressed { .. })) => {
            Some("counter went backwards, press r")
        }
        PollOutcome::Failed(PollError::Rejected(_)) => Some("snapshot rejected"),
    }
}

pub fn harness_status(state: HarnessState, trials: usize) -> Option<String> {
    match state {
        HarnessState::Idle => None,
        HarnessState::WarmingUp => Some("warming up".into()),
        HarnessState::Measuring { trial } => Some(format!("trial {}/{trials}", trial + 1)),
    }
}

pub type Harness = BenchmarkHarness<HttpSource, HttpSource>;

pub struct App {
    poller: Arc<Poller<HttpSource>>,
    harness: Arc<Harness>,
    work: Option<Arc<CommandWorkUnit>>,
    session: DisplaySession,
    activity: ActivityHistory,
    signals: broadcast::Receiver<ExecutionEvent>,
    events: mpsc::Receiver<AppEvent>,
    events_tx: mpsc::Sender<AppEvent>,
    runtime: Handle,
    logs: LogRing,
    endpoint: String,
    status: String,
    bench_status: Option<String>,
    paused: bool,
    focused: bool,
    last_activity_tick: Instant,
}

pub struct AppParts {
    pub poller: Arc<Poller<HttpSource>>,
    pub harness: Arc<Harness>,
    pub work: Option<Arc<CommandWorkUnit>>,
    pub session: DisplaySession,
    pub activity: ActivityHistory,
    pub signals: broadcast::Receiver<ExecutionEvent>,
    pub logs: LogRing,
}

impl App {
    pub fn new(parts: AppParts, runtime: Handle) -> Self {
        let (events_tx, events) = mpsc::channel(32);
        let endpoint = parts.poller.source().url().to_string();
        Self {
            poller: parts.poller,
            harness: parts.harness,
            work: parts.work,
            session: parts.session,
            activity: parts.activity,
            signals: parts.signals,
            events,
            events_tx,
            runtime,
            logs: parts.logs,
            endpoint,
            status: "starting".into(),
            bench_status: None,
            paused: false,
            focused: true,
            last_activity_tick: Instant::now(),
        }
    }

    /// Start the periodic poll. Each tick runs in its own task so a slow
    /// endpoint shows up as skipped ticks rather than a backlog.
    pub fn spawn_poll_loop(&self, interval: Duration) {
        let poller = Arc::clone(&self.poller);
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let poller = Arc::clone(&poller);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = poller.poll().await;
                    let _ = tx.send(AppEvent::Polled(outcome)).await;
                });
            }
        });
    }

    /// Apply focus and pause to the poller. Returns true when this made the
    /// dashboard visible again.
    fn update_visibility(&self) -> bool {
        let visible = self.focused && !self.paused;
        let was_visible = self.poller.is_visible();
        self.poller.set_visible(visible);
        visible && !was_visible
    }

    /// Set visibility and, on becoming visible, refresh right away instead
    /// of waiting for the next tick.
    fn refresh_visibility(&self) {
        if self.update_visibility() {
            self.poll_now();
        }
    }

    /// One poll outside the ticker. Shares the in-flight guard, so it is
    /// skipped if a tick's poll is still running.
    fn poll_now(&self) {
        let poller = Arc::clone(&self.poller);
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let outcome = poller.poll().await;
            let _ = tx.send(AppEvent::Polled(outcome)).await;
        });
    }

    fn start_benchmark(&mut self) {
        let harness = Arc::clone(&self.harness);
        let work = self.work.clone();
        let tx = self.events_tx.clone();
        self.bench_status = Some("starting".into());
        self.runtime.spawn(async move {
            let unit = work.as_deref().map(|w| w as &dyn WorkUnit);
            let result = harness.run(unit).await;
            let _ = tx.send(AppEvent::BenchFinished(result)).await;
        });
    }

    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::ToggleUnits => {
                let mode = self.session.toggle_units();
                tracing::debug!(%mode, "units toggled");
            }
            Action::ToggleChart => {
                let mode = self.session.toggle_chart_mode();
                tracing::debug!(%mode, "chart mode toggled");
            }
            Action::Reset => {
                self.poller.dashboard().reset();
                self.session.clear_chart();
                self.status = "reset".into();
            }
            Action::Pause => {
                self.paused = !self.paused;
                self.refresh_visibility();
            }
            Action::Bench => self.start_benchmark(),
            Action::Quit => return false,
        }
        true
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Polled(outcome) => {
                if let Some(status) = status_for(&outcome) {
                    self.status = status.to_string();
                }
            }
            AppEvent::BenchFinished(Ok(trials)) => {
                let report = BenchmarkReport::from_trials(&trials);
                for line in report.render(None).lines() {
                    tracing::info!("{line}");
                }
                self.bench_status = Some(format!("done, {} trials", trials.len()));
            }
            AppEvent::BenchFinished(Err(err)) => {
                tracing::warn!(error = %err, "benchmark did not complete");
                self.bench_status = Some(err.to_string());
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        loop {
            match self.signals.try_recv() {
                Ok(event) => self.activity.observe(&event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "execution signals lagged");
                }
                Err(_) => break,
            }
        }
        if self.last_activity_tick.elapsed() >= ACTIVITY_TICK {
            self.activity.tick();
            self.last_activity_tick = Instant::now();
        }
    }

    fn refresh_chart(&mut self) {
        let series = self.poller.dashboard().chart(
            self.session.chart_mode,
            self.session.unit_mode,
            Some(&self.activity),
        );
        match series {
            Some(series) => {
                if let Rebind::Created(id) = self.session.present(series) {
                    tracing::debug!(id, mode = %self.session.chart_mode, "chart created");
                }
            }
            None => self.session.clear_chart(),
        }
    }

    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let poll_timeout = Duration::from_millis(16);
        self.update_visibility();

        loop {
            self.drain();
            self.refresh_chart();

            let text = self.poller.dashboard().display(self.session.unit_mode);
            let logs = self.logs.recent(LOG_LINES);
            let bench = harness_status(self.harness.state(), self.harness.trials())
                .or_else(|| self.bench_status.clone());
            let chart = self.session.chart().bound().and_then(|c| c.data.as_ref());

            terminal.draw(|f| {
                let area = f.area();
                render_dashboard(
                    f,
                    area,
                    DashboardView {
                        endpoint: &self.endpoint,
                        text: text.as_ref(),
                        unit_mode: self.session.unit_mode,
                        chart_mode: self.session.chart_mode,
                        chart,
                        status: &self.status,
                        paused: self.paused,
                        benchmark: bench.as_deref(),
                        logs: &logs,
                    },
                );
            })?;

            if !event::poll(poll_timeout)? {
                continue;
            }
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(action) = action_for(key.code) {
                        if !self.apply(action) {
                            return Ok(());
                        }
                    }
                }
                CEvent::FocusGained => {
                    self.focused = true;
                    self.refresh_visibility();
                }
                CEvent::FocusLost => {
                    self.focused = false;
                    self.refresh_visibility();
                }
                _ => {}
            }
        }
    }
}
