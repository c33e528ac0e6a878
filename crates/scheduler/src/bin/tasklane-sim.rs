//! tasklane-sim: replay a scripted scenario against a scheduler.
//!
//! The scenario is a TOML file with a list of `[[step]]` tables, each
//! tagged by `op`:
//!
//! ```toml
//! [[step]]
//! op = "package"
//! name = "intro"
//! kind = "dialog"
//!
//! [[step]]
//! op = "dialog"
//! id = "welcome"
//! package = "intro"
//!
//! [[step]]
//! op = "advance"
//! secs = 20
//!
//! [[step]]
//! op = "tick"
//! ```
//!
//! Time only moves on `advance`, so stall timeouts are deterministic.
//! The final metrics are printed to stdout as JSON.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use tasklane_core::config::load_dotenv;
use tasklane_core::Config;
use tasklane_scheduler::tasks::{DIALOG, FUNCTION};
use tasklane_scheduler::{
    Args, Callback, ItemValue, ManualClock, PackageId, PackageKind, Scheduler, SchedulerConfig,
    TaskFactory, TaskId, Tier,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Replay a task scheduling scenario on a manual clock.
#[derive(Parser, Debug)]
#[command(name = "tasklane-sim", version, about)]
struct Cli {
    /// Path to a scheduler TOML config. Defaults plus env when omitted.
    #[arg(long, env = "TASKLANE_CONFIG")]
    config: Option<PathBuf>,

    /// Scenario file to replay.
    scenario: PathBuf,
}

// ── Scenario ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default, rename = "step")]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Step {
    Busy {
        value: bool,
    },
    Dialog {
        id: String,
        #[serde(default)]
        args: Args,
        tier: Option<Tier>,
        package: Option<String>,
        label: Option<String>,
    },
    Function {
        name: String,
        #[serde(default)]
        args: Args,
        tier: Option<Tier>,
        package: Option<String>,
        label: Option<String>,
    },
    Package {
        name: String,
        kind: Option<PackageKind>,
        tier: Option<Tier>,
    },
    Deliver {
        package: String,
        dialog: Option<String>,
        function: Option<String>,
        #[serde(default)]
        args: Args,
    },
    Ready {
        package: String,
        label: String,
    },
    Advance {
        secs: f64,
    },
    Tick,
    Cancel {
        label: String,
    },
    Reset,
}

// ── Simulation ──────────────────────────────────────────────────────

struct Simulation {
    scheduler: Scheduler,
    clock: Arc<ManualClock>,
    default_tier: Tier,
    packages: HashMap<String, PackageId>,
    labels: HashMap<String, TaskId>,
    callbacks: HashMap<String, Callback>,
}

impl Simulation {
    fn new(config: SchedulerConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let default_tier = config.default_tier;
        let scheduler = Scheduler::new(config, TaskFactory::default()).with_clock(clock.clone());
        Self {
            scheduler,
            clock,
            default_tier,
            packages: HashMap::new(),
            labels: HashMap::new(),
            callbacks: HashMap::new(),
        }
    }

    fn package(&self, name: &str) -> Result<PackageId> {
        self.packages
            .get(name)
            .copied()
            .with_context(|| format!("unknown package '{}'", name))
    }

    fn callback(&mut self, name: &str) -> Callback {
        self.callbacks
            .entry(name.to_string())
            .or_insert_with(|| {
                let name = name.to_string();
                Callback::new(move |dispatch, args| {
                    info!(callback = %name, id = %dispatch.id(), args = %args, "callback invoked");
                    Ok(())
                })
            })
            .clone()
    }

    fn remember(&mut self, label: Option<String>, id: Option<TaskId>) {
        if let (Some(label), Some(id)) = (label, id) {
            self.labels.insert(label, id);
        }
    }

    fn apply(&mut self, index: usize, step: Step) -> Result<()> {
        match step {
            Step::Busy { value } => self.scheduler.set_busy(value),
            Step::Dialog { id, args, tier, package, label } => {
                let package = package.as_deref().map(|p| self.package(p)).transpose()?;
                let tier = tier.unwrap_or(self.default_tier);
                let added = self.scheduler.add_item(DIALOG, ItemValue::Dialog(id), args, tier, package);
                self.remember(label, added);
            }
            Step::Function { name, args, tier, package, label } => {
                let package = package.as_deref().map(|p| self.package(p)).transpose()?;
                let tier = tier.unwrap_or(self.default_tier);
                let callback = self.callback(&name);
                let added = self.scheduler.add_item(FUNCTION, callback.into(), args, tier, package);
                self.remember(label, added);
            }
            Step::Package { name, kind, tier } => {
                let kind = kind.unwrap_or(PackageKind::Generic);
                let tier = tier.unwrap_or(self.default_tier);
                let Some((package, task)) = self.scheduler.schedule_package(kind, tier) else {
                    bail!("step {}: package '{}' could not be scheduled", index, name);
                };
                self.packages.insert(name.clone(), package);
                self.labels.insert(name, task);
            }
            Step::Deliver { package, dialog, function, args } => {
                let package = self.package(&package)?;
                let (kind, value) = match (dialog, function) {
                    (Some(id), None) => (DIALOG, ItemValue::Dialog(id)),
                    (None, Some(name)) => (FUNCTION, self.callback(&name).into()),
                    _ => bail!("step {}: deliver needs exactly one of 'dialog' or 'function'", index),
                };
                self.scheduler.deliver_item(package, kind, value, args);
            }
            Step::Ready { package, label } => {
                let package = self.package(&package)?;
                let id = *self
                    .labels
                    .get(&label)
                    .with_context(|| format!("step {}: unknown label '{}'", index, label))?;
                self.scheduler.mark_ready(package, id);
            }
            Step::Advance { secs } => {
                let by = Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("step {}: invalid duration {}", index, secs))?;
                self.clock.advance(by);
            }
            Step::Tick => self.scheduler.tick(),
            Step::Cancel { label } => {
                let id = *self
                    .labels
                    .get(&label)
                    .with_context(|| format!("step {}: unknown label '{}'", index, label))?;
                self.scheduler.remove_task(id);
            }
            Step::Reset => {
                self.scheduler.reset();
                self.packages.clear();
                self.labels.clear();
            }
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "elapsed_secs": self.clock.elapsed().as_secs_f64(),
            "pending_tasks": self.scheduler.len(),
            "open_packages": self.scheduler.packages().count(),
            "metrics": self.scheduler.metrics(),
        })
    }
}

// ── Main ────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    load_dotenv();
    let core = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&core.log.filter)),
        )
        .with_ansi(core.log.ansi)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    core.log_summary();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SchedulerConfig::from_env_profiled(&core.profile),
    };
    config.validate()?;

    let raw = std::fs::read_to_string(&cli.scenario)
        .with_context(|| format!("failed to read scenario {}", cli.scenario.display()))?;
    let scenario: Scenario = toml::from_str(&raw).context("failed to parse scenario")?;

    info!(
        steps = scenario.steps.len(),
        timeout_secs = config.package_timeout_secs,
        "replaying scenario"
    );

    let mut sim = Simulation::new(config);
    for (index, step) in scenario.steps.into_iter().enumerate() {
        sim.apply(index, step)?;
    }

    println!("{}", serde_json::to_string_pretty(&sim.report())?);
    Ok(())
}
