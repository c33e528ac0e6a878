use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tasklane_core::config::{profiled_env_opt, profiled_env_or};
use tasklane_core::TasklaneError;
use uuid::Uuid;

/// Scheduling tier. Each tier is an independent bit so a task may belong
/// to several tiers at once; a higher bit is a more severe tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// At most one pending request of its kind is expected.
    Singleton,
    /// Default tier. Waits for a quiet moment.
    Low,
    Medium,
    High,
    /// Preempts the busy flag.
    Immediate,
    /// Suppresses everything below it until it runs.
    Blocking,
    Maintenance,
}

impl Tier {
    /// All tiers, least severe first.
    pub const ALL: [Tier; 7] = [
        Tier::Singleton,
        Tier::Low,
        Tier::Medium,
        Tier::High,
        Tier::Immediate,
        Tier::Blocking,
        Tier::Maintenance,
    ];

    /// The tier's bit within a [`Rating`].
    pub const fn bit(self) -> u8 {
        match self {
            Tier::Singleton => 1 << 0,
            Tier::Low => 1 << 1,
            Tier::Medium => 1 << 2,
            Tier::High => 1 << 3,
            Tier::Immediate => 1 << 4,
            Tier::Blocking => 1 << 5,
            Tier::Maintenance => 1 << 6,
        }
    }

    /// Parse a lowercase tier name (`"low"`, `"blocking"`, ...).
    pub fn parse(name: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Singleton => "singleton",
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
            Tier::Immediate => "immediate",
            Tier::Blocking => "blocking",
            Tier::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask over [`Tier`]s. Numeric order is severity order: the highest
/// set bit dominates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const EMPTY: Rating = Rating(0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Rating(bits)
    }

    /// Whether the rating is numerically at or above the tier's bit.
    pub const fn is_at_least(self, tier: Tier) -> bool {
        self.0 >= tier.bit()
    }

    /// Tiers contained in this rating, least severe first.
    pub fn tiers(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |t| self.0 & t.bit() != 0)
    }
}

impl From<Tier> for Rating {
    fn from(tier: Tier) -> Self {
        Rating(tier.bit())
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.tiers().map(Tier::as_str).collect();
        f.write_str(&names.join("|"))
    }
}

/// Opaque task payload.
pub type Args = serde_json::Value;

/// Identity of a task inside one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Identity of a package inside one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId(pub u64);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comparable handle standing in for a callback reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub Uuid);

impl CallbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Logical key a task is matched by, for deduplication and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TaskKey {
    Dialog(String),
    Callback(CallbackId),
    Package(PackageId),
}

impl TaskKey {
    pub fn dialog(id: impl Into<String>) -> Self {
        TaskKey::Dialog(id.into())
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Dialog(id) => write!(f, "dialog:{}", id),
            TaskKey::Callback(id) => write!(f, "callback:{}", id.0),
            TaskKey::Package(id) => write!(f, "package:{}", id),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Stall window for packages in seconds.
    #[serde(default = "default_package_timeout")]
    pub package_timeout_secs: u64,
    /// Tier applied when a caller does not name one.
    #[serde(default = "default_tier")]
    pub default_tier: Tier,
    /// Upper bound on executions chained from a single `run()`.
    #[serde(default = "default_max_dispatch_chain")]
    pub max_dispatch_chain: usize,
    /// Collapse equal-args duplicates on `add_item`.
    #[serde(default = "default_dedupe_items")]
    pub dedupe_items: bool,
}

fn default_package_timeout() -> u64 { 20 }
fn default_tier() -> Tier { Tier::Low }
fn default_max_dispatch_chain() -> usize { 1024 }
fn default_dedupe_items() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            package_timeout_secs: default_package_timeout(),
            default_tier: default_tier(),
            max_dispatch_chain: default_max_dispatch_chain(),
            dedupe_items: default_dedupe_items(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, TasklaneError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides("");
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TasklaneError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment for the given profile.
    pub fn from_env_profiled(profile: &str) -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(profile);
        config
    }

    /// Apply `TASKLANE_*` overrides. With a profile, `{PROFILE}_TASKLANE_*`
    /// is consulted first.
    pub fn apply_env_overrides(&mut self, profile: &str) {
        if let Some(v) = profiled_env_opt(profile, "TASKLANE_PACKAGE_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
        {
            self.package_timeout_secs = v;
        }
        if let Some(v) = profiled_env_opt(profile, "TASKLANE_MAX_DISPATCH_CHAIN")
            .and_then(|v| v.parse().ok())
        {
            self.max_dispatch_chain = v;
        }
        if let Some(tier) = profiled_env_opt(profile, "TASKLANE_DEFAULT_TIER")
            .and_then(|v| Tier::parse(&v))
        {
            self.default_tier = tier;
        }
        let dedupe = profiled_env_or(profile, "TASKLANE_DEDUPE_ITEMS", "");
        if !dedupe.is_empty() {
            self.dedupe_items = dedupe == "true" || dedupe == "1";
        }
    }

    pub fn validate(&self) -> Result<(), TasklaneError> {
        if self.max_dispatch_chain == 0 {
            return Err(TasklaneError::Config(
                "max_dispatch_chain must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_secs)
    }
}
