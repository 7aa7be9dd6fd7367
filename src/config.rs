//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rollup.toml` files, and folds the team mappings into a
//! [`TeamDirectory`].

use crate::analysis::rollup::DEFAULT_ACCEPTED_SIGN_OFF;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".rollup.toml";

/// Longest accepted velocity window, in days.
pub const MAX_VELOCITY_WINDOW_DAYS: i64 = 3650;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Rollup settings.
    #[serde(default)]
    pub rollup: RollupConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Team name to product owner.
    #[serde(default)]
    pub product_owners: BTreeMap<String, String>,

    /// Program name to the teams working in it.
    #[serde(default)]
    pub programs: BTreeMap<String, Vec<String>>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of items recomputed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "rollup_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Feature rollup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Follow links to backlog items in team projects.
    #[serde(default)]
    pub follow_child_links: bool,

    /// Follow links to milestones in team projects.
    #[serde(default = "default_true")]
    pub follow_milestone_links: bool,

    /// "Sign off" value that lets a feature complete.
    #[serde(default = "default_accepted_sign_off")]
    pub accepted_sign_off: String,

    /// Prefix of the planned-sprint values that are reported.
    #[serde(default = "default_sprint_marker")]
    pub sprint_marker: String,

    /// Trailing window for velocity, in days.
    #[serde(default = "default_velocity_window_days")]
    pub velocity_window_days: i64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            follow_child_links: false,
            follow_milestone_links: true,
            accepted_sign_off: default_accepted_sign_off(),
            sprint_marker: default_sprint_marker(),
            velocity_window_days: default_velocity_window_days(),
        }
    }
}

fn default_accepted_sign_off() -> String {
    DEFAULT_ACCEPTED_SIGN_OFF.to_string()
}

fn default_sprint_marker() -> String {
    "S".to_string()
}

fn default_velocity_window_days() -> i64 {
    14
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Estimate epic items in points (true) or estimated days (false).
    #[serde(default = "default_true")]
    pub use_points: bool,

    /// Custom field shown as the "done" part of epic summaries.
    #[serde(default = "default_completed_field")]
    pub completed_field: String,

    /// Shown when a team has no product owner configured.
    #[serde(default = "default_product_owner")]
    pub default_product_owner: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            use_points: true,
            completed_field: default_completed_field(),
            default_product_owner: default_product_owner(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_completed_field() -> String {
    "Completed work".to_string()
}

fn default_product_owner() -> String {
    "unknown".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        let days = self.rollup.velocity_window_days;
        if !(1..=MAX_VELOCITY_WINDOW_DAYS).contains(&days) {
            bail!(
                "rollup.velocity_window_days must be between 1 and {}, got {}",
                MAX_VELOCITY_WINDOW_DAYS,
                days
            );
        }
        if self.general.concurrency == 0 {
            bail!("general.concurrency must be at least 1");
        }
        Ok(())
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.rollup.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
        if args.follow_child_links {
            self.rollup.follow_child_links = true;
        }
    }

    /// Log level from the CLI flags and the configured verbosity.
    ///
    /// `--quiet` wins over a verbose config file.
    pub fn log_level(&self, args: &crate::cli::Args) -> tracing::Level {
        if !args.quiet && self.general.verbose {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Build the read-only team lookups.
    pub fn team_directory(&self) -> TeamDirectory {
        TeamDirectory::new(&self.product_owners, &self.programs)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Case-insensitive team lookups, built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    product_owners: HashMap<String, String>,
    programs: HashMap<String, HashSet<String>>,
}

impl TeamDirectory {
    pub fn new(
        product_owners: &BTreeMap<String, String>,
        programs: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let product_owners = product_owners
            .iter()
            .map(|(team, owner)| (team.trim().to_lowercase(), owner.clone()))
            .collect();

        let programs = programs
            .iter()
            .map(|(program, teams)| {
                let teams = teams.iter().map(|t| t.trim().to_lowercase()).collect();
                (program.trim().to_lowercase(), teams)
            })
            .collect();

        Self {
            product_owners,
            programs,
        }
    }

    /// Product owner of `team`, if configured.
    pub fn product_owner(&self, team: &str) -> Option<&str> {
        self.product_owners
            .get(&team.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Whether `team` belongs to `program`. Unknown programs contain no teams.
    pub fn is_team_in_program(&self, team: &str, program: &str) -> bool {
        self.programs
            .get(&program.trim().to_lowercase())
            .is_some_and(|teams| teams.contains(&team.trim().to_lowercase()))
    }

    /// Whether any team of a `;`-joined team string belongs to `program`.
    pub fn any_team_in_program(&self, teams: &str, program: &str) -> bool {
        teams
            .split(';')
            .filter(|team| !team.trim().is_empty())
            .any(|team| self.is_team_in_program(team, program))
    }
}
