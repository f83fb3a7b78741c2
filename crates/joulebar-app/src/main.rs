mod app;

use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::runtime::Runtime;

use joulebar_bench::{BenchmarkHarness, BenchmarkReport, BenchmarkTrial, CommandWorkUnit, ExecutionSignals};
use joulebar_config::{ComparisonTableFile, DashboardConfig};
use joulebar_core::activity::ActivityHistory;
use joulebar_core::logging::{self, LoggingOptions};
use joulebar_core::session::DisplaySession;
use joulebar_core::Dashboard;
use joulebar_source::{HttpSource, PollOutcome, Poller};

use crate::app::{App, AppParts};

#[derive(Debug, Parser)]
#[command(name = "joulebar", version, about = "Live energy usage of your notebook server")]
struct Cli {
    /// Config file; defaults to $JOULEBAR_CONFIG, then the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write the log file as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive dashboard (default).
    Watch(WatchArgs),
    /// Take two snapshots one poll interval apart and print the readout.
    Once,
    /// Paired-trial benchmark of a command against the external probe.
    Bench(BenchArgs),
}

#[derive(Debug, Default, Args)]
struct WatchArgs {
    /// Override endpoint.base_url.
    #[arg(long)]
    base_url: Option<String>,
    /// Command run by the `b` key as the benchmark work unit.
    #[arg(long)]
    work: Option<String>,
}

#[derive(Debug, Args)]
struct BenchArgs {
    /// Command line to execute for each trial.
    #[arg(long = "cmd")]
    command: String,
    #[arg(long)]
    trials: Option<usize>,
    /// Write the trials as JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Earlier trials JSON to report the relative change against.
    #[arg(long)]
    compare: Option<PathBuf>,
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn dashboard_for(config: &DashboardConfig) -> Result<Dashboard> {
    let table = ComparisonTableFile::load(config.comparisons.path.as_deref())?;
    Ok(Dashboard::new(table).with_bucket_width(config.bucket_width()))
}

fn sources(config: &DashboardConfig) -> Result<(HttpSource, HttpSource)> {
    let metrics = HttpSource::metrics_endpoint(&config.base_url()?, config.timeout())
        .context("building the metrics endpoint client")?;
    let probe = HttpSource::probe(config.probe.port, config.timeout())
        .context("building the probe client")?;
    Ok((metrics, probe))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = logging::init(LoggingOptions {
        json: cli.log_json,
        ..LoggingOptions::default()
    })
    .context("failed to initialize logging")?;
    tracing::info!(log_dir = %log.dir.display(), "joulebar starting up");

    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    let runtime = Runtime::new().context("failed to start the async runtime")?;

    match cli.command.unwrap_or(Command::Watch(WatchArgs::default())) {
        Command::Watch(args) => {
            if let Some(url) = args.base_url {
                config.endpoint.base_url = url;
                config.validate()?;
            }
            watch(&runtime, &config, args.work.as_deref(), log.ring.clone())
        }
        Command::Once => runtime.block_on(once(&config)),
        Command::Bench(args) => runtime.block_on(bench(&config, args)),
    }
}

fn watch(
    runtime: &Runtime,
    config: &DashboardConfig,
    work: Option<&str>,
    logs: logging::LogRing,
) -> Result<()> {
    let (metrics, probe) = sources(config)?;
    let signals = ExecutionSignals::default();
    let work = work
        .map(|cmd| CommandWorkUnit::parse(cmd).map(|u| Arc::new(u.with_signals(signals.clone()))))
        .transpose()?;
    let harness = BenchmarkHarness::new(metrics.clone(), probe).with_trials(config.benchmark.trials);
    let poller = Arc::new(Poller::new(metrics, dashboard_for(config)?));

    let _rt = runtime.enter();
    let mut app = App::new(
        AppParts {
            poller,
            harness: Arc::new(harness),
            work,
            session: DisplaySession::new(config.units.default, config.chart.default_mode),
            activity: ActivityHistory::new(config.chart.activity_samples),
            signals: signals.subscribe(),
            logs,
        },
        runtime.handle().clone(),
    );
    app.spawn_poll_loop(config.poll_interval());

    let mut terminal = setup_terminal()?;
    let res = app.run(&mut terminal);
    restore_terminal(terminal)?;
    tracing::info!("joulebar shutting down");
    res
}

async fn once(config: &DashboardConfig) -> Result<()> {
    let (metrics, _) = sources(config)?;
    let poller = Poller::new(metrics, dashboard_for(config)?);

    for attempt in 0..2 {
        if attempt > 0 {
            tokio::time::sleep(config.poll_interval()).await;
        }
        if let PollOutcome::Failed(err) = poller.poll().await {
            return Err(err).context("polling the metrics endpoint");
        }
    }

    let dashboard = poller.dashboard();
    let Some(text) = dashboard.display(config.units.default) else {
        bail!("no reading after two polls");
    };
    println!("Now    {}", text.now);
    println!("Total  {}", text.total);
    println!("Green  {} (grid now {})", text.renewable_window, text.renewable_now);
    println!("Enough energy to {} {}", text.emoji, text.comparison);
    Ok(())
}

fn read_trials(path: &Path) -> Result<Vec<BenchmarkTrial>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trials from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing trials in {}", path.display()))
}

async fn bench(config: &DashboardConfig, args: BenchArgs) -> Result<()> {
    let baseline = args.compare.as_deref().map(read_trials).transpose()?;
    let (metrics, probe) = sources(config)?;
    let unit = CommandWorkUnit::parse(&args.command)?;
    let harness = BenchmarkHarness::new(metrics, probe)
        .with_trials(args.trials.unwrap_or(config.benchmark.trials));

    let trials = harness.run(Some(&unit)).await?;
    let json = serde_json::to_string_pretty(&trials)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing trials to {}", path.display()))?,
        None => println!("{json}"),
    }

    let report = BenchmarkReport::from_trials(&trials);
    let baseline = baseline.map(|t| BenchmarkReport::from_trials(&t));
    eprint!("{}", report.render(baseline.as_ref()));
    Ok(())
}
