//! Server configuration from environment.

use arbiter_core::{ArbiterRules, Hemisphere, DEFAULT_UTM_ZONE, MIN_SAMPLE_STEP_M};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ALGORITHMS: [&str; 4] = ["dijkstra", "astar", "random", "combined"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not valid JSON: {source}")]
    InvalidJson {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{key} has invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be positive, got {value}")]
    NonPositive { key: &'static str, value: f64 },
    #[error("{key} must be a non-negative number, got {value}")]
    Negative { key: &'static str, value: f64 },
    #[error("{key} must be at least {min}, got {value}")]
    BelowMinimum {
        key: &'static str,
        value: f64,
        min: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Delay between arbitration cycles
    pub poll_interval: Duration,
    /// Agents polled every cycle, in configured order
    pub agents: Vec<String>,
    /// Agent id -> base URL of that agent's route planner
    pub agent_servers: HashMap<String, String>,
    pub path_source_url: String,
    pub path_timeout: Duration,
    pub candidate_algorithms: Vec<String>,
    pub random_runs: u32,
    pub use_crop: bool,
    pub candidates_timeout: Duration,
    pub recommendation_timeout: Duration,
    pub max_concurrent_replans: usize,
    pub utm_zone: u8,
    pub hemisphere: Hemisphere,
    pub rules: ArbiterRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8000,
            poll_interval: Duration::from_secs(2),
            agents: Vec::new(),
            agent_servers: HashMap::new(),
            path_source_url: "http://localhost:8545".to_string(),
            path_timeout: Duration::from_secs(5),
            candidate_algorithms: DEFAULT_ALGORITHMS.iter().map(|s| s.to_string()).collect(),
            random_runs: 3,
            use_crop: true,
            candidates_timeout: Duration::from_secs(20),
            recommendation_timeout: Duration::from_secs(5),
            max_concurrent_replans: 4,
            utm_zone: DEFAULT_UTM_ZONE,
            hemisphere: Hemisphere::North,
            rules: ArbiterRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let agents = match get("CAR_ADDRS") {
            Some(raw) => parse_agents(&raw),
            None => Vec::new(),
        };
        let agent_servers = match get("CAR_SERVER_MAP") {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::InvalidJson {
                key: "CAR_SERVER_MAP",
                source,
            })?,
            None => HashMap::new(),
        };
        let candidate_algorithms = match get("CANDIDATE_ALGOS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::InvalidJson {
                key: "CANDIDATE_ALGOS",
                source,
            })?,
            None => defaults.candidate_algorithms,
        };
        let hemisphere = match get("ARBITER_UTM_HEMISPHERE").map(|h| h.to_lowercase()) {
            None => defaults.hemisphere,
            Some(h) if h == "north" || h == "n" => Hemisphere::North,
            Some(h) if h == "south" || h == "s" => Hemisphere::South,
            Some(h) => {
                return Err(ConfigError::InvalidValue {
                    key: "ARBITER_UTM_HEMISPHERE",
                    value: h,
                })
            }
        };

        let rules = ArbiterRules {
            safety_radius_m: parse_or(&get, "AGENT_SAFETY_RADIUS_M", defaults.rules.safety_radius_m)?,
            area_threshold_m2: parse_or(
                &get,
                "ARBITER_AREA_THRESHOLD_M2",
                defaults.rules.area_threshold_m2,
            )?,
            severity_threshold_m2: parse_or(
                &get,
                "ARBITER_SEVERITY_THRESHOLD_M2",
                defaults.rules.severity_threshold_m2,
            )?,
            length_weight: parse_or(&get, "ARBITER_LENGTH_WEIGHT", defaults.rules.length_weight)?,
            ranking_size: parse_or(&get, "ARBITER_RANKING_SIZE", defaults.rules.ranking_size)?,
            sample_step_m: parse_or(&get, "ARBITER_SAMPLE_STEP_M", defaults.rules.sample_step_m)?,
        };

        let config = Self {
            server_port: parse_or(&get, "ARBITER_PORT", defaults.server_port)?,
            poll_interval: seconds_or(&get, "AGENT_POLL_SECONDS", defaults.poll_interval)?,
            agents,
            agent_servers,
            path_source_url: get("ARBITER_PATH_SOURCE_URL").unwrap_or(defaults.path_source_url),
            path_timeout: seconds_or(&get, "ARBITER_PATH_TIMEOUT_SECS", defaults.path_timeout)?,
            candidate_algorithms,
            random_runs: parse_or(&get, "ARBITER_RANDOM_RUNS", defaults.random_runs)?,
            use_crop: get("CANDIDATES_USE_CROP")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.use_crop),
            candidates_timeout: seconds_or(
                &get,
                "ARBITER_CANDIDATES_TIMEOUT_SECS",
                defaults.candidates_timeout,
            )?,
            recommendation_timeout: seconds_or(
                &get,
                "ARBITER_NOTIFY_TIMEOUT_SECS",
                defaults.recommendation_timeout,
            )?,
            max_concurrent_replans: parse_or(
                &get,
                "ARBITER_MAX_CONCURRENT_REPLANS",
                defaults.max_concurrent_replans,
            )?,
            utm_zone: parse_or(&get, "ARBITER_UTM_ZONE", defaults.utm_zone)?,
            hemisphere,
            rules,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("AGENT_SAFETY_RADIUS_M", self.rules.safety_radius_m)?;
        positive("ARBITER_SAMPLE_STEP_M", self.rules.sample_step_m)?;
        if self.rules.sample_step_m < MIN_SAMPLE_STEP_M {
            return Err(ConfigError::BelowMinimum {
                key: "ARBITER_SAMPLE_STEP_M",
                value: self.rules.sample_step_m,
                min: MIN_SAMPLE_STEP_M,
            });
        }
        non_negative("ARBITER_AREA_THRESHOLD_M2", self.rules.area_threshold_m2)?;
        non_negative(
            "ARBITER_SEVERITY_THRESHOLD_M2",
            self.rules.severity_threshold_m2,
        )?;
        non_negative("ARBITER_LENGTH_WEIGHT", self.rules.length_weight)?;
        positive("AGENT_POLL_SECONDS", self.poll_interval.as_secs_f64())?;
        positive(
            "ARBITER_MAX_CONCURRENT_REPLANS",
            self.max_concurrent_replans as f64,
        )?;
        positive("ARBITER_RANKING_SIZE", self.rules.ranking_size as f64)?;
        if !(1..=60).contains(&self.utm_zone) {
            return Err(ConfigError::InvalidValue {
                key: "ARBITER_UTM_ZONE",
                value: self.utm_zone.to_string(),
            });
        }
        Ok(())
    }

    pub fn server_for(&self, agent_id: &str) -> Option<&str> {
        self.agent_servers.get(agent_id).map(String::as_str)
    }
}

/// Comma separated ids; blanks and repeats are dropped, first occurrence wins.
fn parse_agents(raw: &str) -> Vec<String> {
    let mut agents: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !agents.iter().any(|known| known == id) {
            agents.push(id.to_string());
        }
    }
    agents
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn seconds_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_or(get, key, default.as_secs_f64())?;
    positive(key, secs)?;
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        key,
        value: secs.to_string(),
    })
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { key, value })
    }
}

fn non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { key, value })
    }
}
