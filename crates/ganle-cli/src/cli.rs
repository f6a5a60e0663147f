use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use ganle_core::logging::init_tracing;
use ganle_core::{
    AlertState, AppContext, ClientConfig, DesktopNotifier, MemoryBackend, MemorySnapshot,
    Notifier, SharedGateway, TracingNotifier, ViewSnapshot,
};
use ganle_shared::{SmartList, TaskDto, TaskPriority, ViewSelector};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ganle",
    version,
    about = "Ganle: task views, mutations and due reminders",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config file; defaults to $GANLE_CONFIG, then the user config dir.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// JSON snapshot to seed the in-memory backend with.
    #[arg(long = "seed")]
    pub seed: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory.
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the selected view once.
    Show(ViewArgs),
    /// Keep running: re-print on change, report reminders, exit on SIGINT/SIGTERM.
    Watch(ViewArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// `today`, `week`, `all`, `completed`, `favorite`, `project:<id>` or `tag:<id>`.
    #[arg(long = "view")]
    pub view: Option<ViewSelector>,

    #[arg(long = "search")]
    pub search: Option<String>,
}

#[tracing::instrument(skip_all)]
pub async fn run(cli: GlobalCli) -> anyhow::Result<()> {
    let _log_guard = init_tracing(cli.verbose, cli.quiet, cli.log_dir.as_deref())?;
    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting ganle"
    );

    let cfg = ClientConfig::load(cli.config.as_deref())?;
    debug!(?cfg, "resolved config");

    let seed = match &cli.seed {
        Some(path) => MemorySnapshot::load(path)?,
        None => MemorySnapshot::default(),
    };
    let backend = MemoryBackend::seeded(seed).with_clock(Utc::now, cfg.tz()?);
    let gateway: SharedGateway = Arc::new(backend);
    let notifier: Arc<dyn Notifier> = if cfg.desktop_notifications {
        Arc::new(DesktopNotifier)
    } else {
        Arc::new(TracingNotifier)
    };
    let mut app = AppContext::from_config(gateway, notifier, &cfg)?;

    match cli.command {
        Command::Show(args) => {
            apply_view_args(&app, args);
            app.coordinator().load_all().await;
            print!("{}", render_snapshot(&app.snapshot()));
        }
        Command::Watch(args) => {
            apply_view_args(&app, args);
            app.start().await;
            watch(&app).await;
            app.shutdown().await;
        }
    }

    info!("done");
    Ok(())
}

fn apply_view_args(app: &AppContext, args: ViewArgs) {
    if let Some(view) = args.view {
        app.set_view(view);
    }
    if let Some(search) = args.search {
        app.set_search(&search);
    }
}

async fn watch(app: &AppContext) {
    let mut engine = app.view_engine();
    let mut last = engine.snapshot();
    let mut announced: Option<String> = None;
    print!("{}", render_snapshot(&last));

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("received shutdown signal; exiting");
                break;
            }
            alive = engine.changed() => {
                if !alive {
                    break;
                }
                let next = engine.snapshot();
                if next != last {
                    print!("{}", render_snapshot(&next));
                    last = next;
                }
                match app.alert() {
                    AlertState::Pending(task) if announced.as_deref() != Some(task.id.as_str()) => {
                        println!("!! reminder: {}", task.title);
                        announced = Some(task.id);
                    }
                    AlertState::Pending(_) => {}
                    AlertState::Idle => announced = None,
                }
            }
        }
    }
}

pub fn render_snapshot(snapshot: &ViewSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ({}) ==", snapshot.title, snapshot.tasks.len());
    for task in &snapshot.tasks {
        let _ = writeln!(out, "{}", render_task(task));
    }
    let counts = SmartList::ALL
        .iter()
        .map(|list| format!("{} {}", list.as_str(), snapshot.counts.get(*list)))
        .collect::<Vec<_>>()
        .join(" | ");
    let _ = writeln!(out, "-- {counts}");
    out
}

fn render_task(task: &TaskDto) -> String {
    let mark = if task.is_completed() { "x" } else { " " };
    let mut line = format!("[{mark}] {}", task.title);
    if let Some(due) = &task.due_date {
        let _ = write!(line, "  due {due}");
    }
    match task.priority {
        TaskPriority::High => line.push_str("  !high"),
        TaskPriority::Low => line.push_str("  !low"),
        TaskPriority::Medium => {}
    }
    if task.favorite {
        line.push_str("  *");
    }
    line
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to register SIGINT handler; falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to register SIGTERM handler; falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed waiting for ctrl_c signal");
    }
}
