use kodou::Endpoint;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_ADDRESS: &str = "ipc://heartbeat";
pub const DEFAULT_COMMAND_ADDRESS: &str = "ipc://command";
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_ALLOWED_MISSES: u32 = 2;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);
/// Upper bound for the heartbeat period and the cooldown.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Supervisor settings. Built once at startup and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
	/// Executable followed by its arguments.
	pub command: Vec<String>,
	pub heartbeat_address: Endpoint,
	pub command_address: Endpoint,
	/// Expected interval between heartbeats.
	pub heartbeat_period: Duration,
	/// Consecutive missed periods tolerated before the child is killed.
	pub allowed_misses: u32,
	/// Pause between a failed Run and the next spawn.
	pub cooldown: Duration,
}

impl Config {
	pub fn new(command: Vec<String>) -> Self {
		Self {
			command,
			heartbeat_address: default_endpoint(DEFAULT_HEARTBEAT_ADDRESS),
			command_address: default_endpoint(DEFAULT_COMMAND_ADDRESS),
			heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
			allowed_misses: DEFAULT_ALLOWED_MISSES,
			cooldown: DEFAULT_COOLDOWN,
		}
	}

	/// Extra time granted after spawn before the first heartbeat is due.
	pub fn grace_period(&self) -> Duration {
		self.heartbeat_period * 2
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.command.is_empty() || self.command[0].is_empty() {
			return Err(ConfigError::Invalid("no command to supervise".into()));
		}
		if self.heartbeat_period.is_zero() {
			return Err(ConfigError::Invalid("heartbeat_period must be greater than zero".into()));
		}
		if self.heartbeat_period > MAX_DURATION {
			return Err(ConfigError::Invalid(format!(
				"heartbeat_period must be at most {:?}",
				MAX_DURATION
			)));
		}
		if self.cooldown > MAX_DURATION {
			return Err(ConfigError::Invalid(format!("cooldown must be at most {:?}", MAX_DURATION)));
		}
		if self.allowed_misses == 0 {
			return Err(ConfigError::Invalid("allowed_misses must be at least 1".into()));
		}
		if self.heartbeat_address == self.command_address {
			return Err(ConfigError::Invalid(format!(
				"heartbeat and command channels share the address {}",
				self.heartbeat_address
			)));
		}
		Ok(())
	}

	/// Layer `overrides` over `file` over the defaults, then validate.
	pub fn resolve(file: ConfigFile, overrides: Overrides) -> Result<Self, ConfigError> {
		let command = if overrides.command.is_empty() {
			file.command.unwrap_or_default()
		} else {
			overrides.command
		};
		let mut config = Config::new(command);

		if let Some(addr) = overrides.heartbeat_address.or(file.heartbeat_address) {
			config.heartbeat_address = parse_endpoint("heartbeat_address", &addr)?;
		}
		if let Some(addr) = overrides.command_address.or(file.command_address) {
			config.command_address = parse_endpoint("command_address", &addr)?;
		}

		let file_period = file
			.heartbeat_period
			.map(|v| v.into_duration("heartbeat_period"))
			.transpose()?;
		if let Some(period) = overrides.heartbeat_period.or(file_period) {
			config.heartbeat_period = period;
		}

		let file_cooldown = file.cooldown.map(|v| v.into_duration("cooldown")).transpose()?;
		if let Some(cooldown) = overrides.cooldown.or(file_cooldown) {
			config.cooldown = cooldown;
		}

		if let Some(misses) = overrides.allowed_misses.or(file.allowed_misses) {
			config.allowed_misses = misses;
		}

		config.validate()?;
		Ok(config)
	}
}

/// The default addresses are `ipc://` paths.
fn default_endpoint(address: &str) -> Endpoint {
	Endpoint::ipc(address.trim_start_matches("ipc://"))
}

fn parse_endpoint(key: &str, raw: &str) -> Result<Endpoint, ConfigError> {
	Endpoint::parse(raw).map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))
}

// ── config.toml ─────────────────────────────────────────────────────────────

/// Contents of a `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
	pub command: Option<Vec<String>>,
	pub heartbeat_address: Option<String>,
	pub command_address: Option<String>,
	pub heartbeat_period: Option<DurationValue>,
	pub allowed_misses: Option<u32>,
	pub cooldown: Option<DurationValue>,
}

/// A duration as written in TOML: `"500ms"`, `"2s"`, `1.5` or `3`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
	Whole(u64),
	Fractional(f64),
	Text(String),
}

impl DurationValue {
	fn into_duration(self, key: &str) -> Result<Duration, ConfigError> {
		let parsed = match self {
			DurationValue::Whole(secs) => positive(secs as f64),
			DurationValue::Fractional(secs) => positive(secs),
			DurationValue::Text(text) => parse_duration(&text),
		};
		parsed.map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))
	}
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub command: Vec<String>,
	pub heartbeat_address: Option<String>,
	pub command_address: Option<String>,
	pub heartbeat_period: Option<Duration>,
	pub allowed_misses: Option<u32>,
	pub cooldown: Option<Duration>,
}

/// Parse `500ms`, `2s`, `1.5s` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
	let raw = raw.trim();
	let (number, per_second) = if let Some(ms) = raw.strip_suffix("ms") {
		(ms, 1000.0)
	} else if let Some(s) = raw.strip_suffix('s') {
		(s, 1.0)
	} else {
		(raw, 1.0)
	};

	let value: f64 = number
		.trim()
		.parse()
		.map_err(|_| format!("invalid duration: {:?}", raw))?;
	positive(value / per_second)
}

fn positive(secs: f64) -> Result<Duration, String> {
	if !secs.is_finite() || secs <= 0.0 {
		return Err(format!("duration must be positive, got {}", secs));
	}
	Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join("heartwatch")
	} else if let Ok(home) = std::env::var("HOME") {
		PathBuf::from(home).join(".config").join("heartwatch")
	} else {
		PathBuf::from("/tmp").join("heartwatch").join("config")
	}
}

pub fn default_config_path() -> PathBuf {
	config_dir().join("config.toml")
}

pub fn load_file(path: &Path) -> Result<ConfigFile, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	toml::from_str(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

/// Load the explicit file if given, else the default one if it exists.
pub fn load(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
	match explicit {
		Some(path) => load_file(path),
		None => {
			let path = default_config_path();
			if path.exists() {
				tracing::debug!("using config {}", path.display());
				load_file(&path)
			} else {
				Ok(ConfigFile::default())
			}
		}
	}
}

// ── errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
	Read { path: PathBuf, source: std::io::Error },
	Parse { path: PathBuf, source: toml::de::Error },
	Invalid(String),
}

impl std::fmt::Display for ConfigError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "failed to read {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, source } => {
				write!(f, "failed to parse {}: {}", path.display(), source)
			}
			ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
		}
	}
}

impl std::error::Error for ConfigError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ConfigError::Read { source, .. } => Some(source),
			ConfigError::Parse { source, .. } => Some(source),
			ConfigError::Invalid(_) => None,
		}
	}
}
