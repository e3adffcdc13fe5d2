//! Unified configuration for the sprint orchestrator.
//!
//! Settings come from `.sprint/sprint.toml` in the project directory, are
//! overridden by `SPRINT_*` environment variables, and finally by CLI flags.
//! Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [tools]
//! ic_cmd = "ic"
//! bd_cmd = "bd"
//!
//! [claims]
//! session_stale_secs = 3600
//! advisory_stale_secs = 7200
//!
//! [lock]
//! dir = "/tmp/intercore/locks"
//! retries = 10
//! retry_interval_ms = 100
//! timeout_ms = 500
//!
//! [budget]
//! agency_spec = "config/agency-spec.yaml"
//!
//! [checkpoint]
//! legacy_file = ".clavain/checkpoint.json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sprint_common::claim::{ADVISORY_STALE_SECS, SESSION_STALE_SECS};

/// Name of the per-project configuration directory.
pub const SPRINT_DIR: &str = ".sprint";
/// File name of the stage budget specification.
pub const AGENCY_SPEC_FILE: &str = "agency-spec.yaml";

/// External collaborator commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsSection {
    /// Run store CLI (default: "ic", falling back to "intercore")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ic_cmd: Option<String>,
    /// Issue tracker CLI (default: "bd")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bd_cmd: Option<String>,
}

/// Claim staleness windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsSection {
    #[serde(default = "default_session_stale_secs")]
    pub session_stale_secs: i64,
    #[serde(default = "default_advisory_stale_secs")]
    pub advisory_stale_secs: i64,
}

fn default_session_stale_secs() -> i64 {
    SESSION_STALE_SECS
}

fn default_advisory_stale_secs() -> i64 {
    ADVISORY_STALE_SECS
}

impl Default for ClaimsSection {
    fn default() -> Self {
        Self {
            session_stale_secs: default_session_stale_secs(),
            advisory_stale_secs: default_advisory_stale_secs(),
        }
    }
}

/// Claim lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSection {
    /// Root of the directory-lock fallback (default: `<tmp>/intercore/locks`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_lock_retries")]
    pub retries: u32,
    #[serde(default = "default_lock_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Acquisition timeout handed to the run store's lock service
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_lock_retries() -> u32 {
    10
}

fn default_lock_retry_interval_ms() -> u64 {
    100
}

fn default_lock_timeout_ms() -> u64 {
    500
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            dir: None,
            retries: default_lock_retries(),
            retry_interval_ms: default_lock_retry_interval_ms(),
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSection {
    /// Stage budget specification (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_spec: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSection {
    /// File-based checkpoint left behind by older sessions
    #[serde(default = "default_legacy_file")]
    pub legacy_file: PathBuf,
}

fn default_legacy_file() -> PathBuf {
    PathBuf::from(".clavain/checkpoint.json")
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            legacy_file: default_legacy_file(),
        }
    }
}

/// Contents of `.sprint/sprint.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprintToml {
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub claims: ClaimsSection,
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
}

impl SprintToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sprint.toml")
    }

    /// Load `<sprint_dir>/sprint.toml`, or defaults when the file is absent.
    pub fn load_or_default(sprint_dir: &Path) -> Result<Self> {
        let config_path = sprint_dir.join("sprint.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.claims.session_stale_secs <= 0 {
            warnings.push(format!(
                "claims.session_stale_secs = {}: every session claim will be treated as stale",
                self.claims.session_stale_secs
            ));
        }
        if self.claims.advisory_stale_secs <= 0 {
            warnings.push(format!(
                "claims.advisory_stale_secs = {}: every advisory claim will be treated as stale",
                self.claims.advisory_stale_secs
            ));
        }
        if self.lock.retries == 0 {
            warnings.push(
                "lock.retries = 0: the directory lock fallback will never be acquired".to_string(),
            );
        }

        warnings
    }
}

/// `SPRINT_*` environment overrides, captured once per invocation.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub ic_cmd: Option<String>,
    pub bd_cmd: Option<String>,
    pub skip_budget: bool,
    pub skip_gate: bool,
    pub bead_id: Option<String>,
    pub session_id: Option<String>,
    pub agency_spec: Option<PathBuf>,
    pub checkpoint_file: Option<PathBuf>,
    pub lock_dir: Option<PathBuf>,
    pub sprint_dir: Option<PathBuf>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            ic_cmd: env_nonempty("SPRINT_IC_CMD"),
            bd_cmd: env_nonempty("SPRINT_BD_CMD"),
            skip_budget: env_nonempty("SPRINT_SKIP_BUDGET").is_some(),
            skip_gate: env_nonempty("SPRINT_SKIP_GATE").is_some(),
            bead_id: env_nonempty("SPRINT_BEAD_ID"),
            session_id: env_nonempty("SPRINT_SESSION_ID"),
            agency_spec: env_nonempty("SPRINT_AGENCY_SPEC").map(PathBuf::from),
            checkpoint_file: env_nonempty("SPRINT_CHECKPOINT_FILE").map(PathBuf::from),
            lock_dir: env_nonempty("SPRINT_LOCK_DIR").map(PathBuf::from),
            sprint_dir: env_nonempty("SPRINT_DIR").map(PathBuf::from),
        }
    }
}

/// Effective configuration for one invocation.
///
/// It merges settings from:
/// 1. sprint.toml file
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct SprintConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .sprint directory
    pub sprint_dir: PathBuf,
    /// Parsed sprint.toml configuration
    pub toml: SprintToml,
    /// Environment overrides
    pub env: EnvOverrides,
    /// CLI override: verbose mode
    pub verbose: bool,
}

impl SprintConfig {
    /// Load configuration for `project_dir` using the process environment.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        Self::with_env(project_dir, EnvOverrides::from_env())
    }

    /// Load configuration for `project_dir` with explicit environment overrides.
    pub fn with_env(project_dir: PathBuf, env: EnvOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let sprint_dir = project_dir.join(SPRINT_DIR);
        let toml = SprintToml::load_or_default(&sprint_dir)?;

        Ok(Self {
            project_dir,
            sprint_dir,
            toml,
            env,
            verbose: false,
        })
    }

    /// Create SprintConfig with CLI overrides.
    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    /// Run store command (env → file → default).
    pub fn ic_cmd(&self) -> Option<String> {
        self.env
            .ic_cmd
            .clone()
            .or_else(|| self.toml.tools.ic_cmd.clone())
    }

    /// Issue tracker command (env → file → default).
    pub fn bd_cmd(&self) -> String {
        self.env
            .bd_cmd
            .clone()
            .or_else(|| self.toml.tools.bd_cmd.clone())
            .unwrap_or_else(|| "bd".to_string())
    }

    pub fn skip_budget(&self) -> bool {
        self.env.skip_budget
    }

    pub fn skip_gate(&self) -> bool {
        self.env.skip_gate
    }

    /// Sprint identifier of the surrounding session, if exported.
    pub fn bead_id(&self) -> Option<&str> {
        self.env.bead_id.as_deref()
    }

    /// Session identifier of the surrounding session (`unknown` when unset).
    pub fn session_id(&self) -> String {
        self.env
            .session_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn session_stale_secs(&self) -> i64 {
        self.toml.claims.session_stale_secs
    }

    pub fn advisory_stale_secs(&self) -> i64 {
        self.toml.claims.advisory_stale_secs
    }

    /// Root of the directory-lock fallback (env → file → `<tmp>/intercore/locks`).
    pub fn lock_dir(&self) -> PathBuf {
        self.env
            .lock_dir
            .clone()
            .or_else(|| self.toml.lock.dir.clone())
            .unwrap_or_else(|| std::env::temp_dir().join("intercore").join("locks"))
    }

    pub fn lock_retries(&self) -> u32 {
        self.toml.lock.retries
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.toml.lock.retry_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.toml.lock.timeout_ms)
    }

    /// Legacy file-based checkpoint (env → file), relative to the project.
    pub fn checkpoint_file(&self) -> PathBuf {
        let path = self
            .env
            .checkpoint_file
            .clone()
            .unwrap_or_else(|| self.toml.checkpoint.legacy_file.clone());
        self.resolve(path)
    }

    /// Candidate locations of the stage budget specification, in priority order.
    pub fn agency_spec_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = self
            .env
            .agency_spec
            .clone()
            .or_else(|| self.toml.budget.agency_spec.clone())
        {
            candidates.push(self.resolve(path));
        }
        candidates.push(self.sprint_dir.join(AGENCY_SPEC_FILE));
        if let Some(dir) = &self.env.sprint_dir {
            candidates.push(dir.join("config").join(AGENCY_SPEC_FILE));
        }
        candidates
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    /// The file configuration with environment overrides folded in.
    pub fn effective(&self) -> SprintToml {
        let mut toml = self.toml.clone();
        toml.tools.ic_cmd = self.ic_cmd();
        toml.tools.bd_cmd = Some(self.bd_cmd());
        toml.lock.dir = Some(self.lock_dir());
        toml.checkpoint.legacy_file = self.checkpoint_file();
        if let Some(path) = &self.env.agency_spec {
            toml.budget.agency_spec = Some(self.resolve(path.clone()));
        }
        toml
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Some(path) = self
            .env
            .agency_spec
            .as_ref()
            .or(self.toml.budget.agency_spec.as_ref())
        {
            let path = self.resolve(path.clone());
            if !path.is_file() {
                warnings.push(format!(
                    "budget.agency_spec {} does not exist; stages will not be partitioned",
                    path.display()
                ));
            }
        }
        warnings
    }
}
