//! Host binary support: options, config-file merging and the node that wires
//! the registry, the aggregation service, the store and the checkpoint loop.

pub mod error;
pub mod node;

use std::{path::PathBuf, time::Duration};

use alloy_primitives::B256;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sffl_core::{QuorumNumber, QuorumThresholdPercentage};
use sffl_lib::{hasher::protocol_version_from_str, SfflHasher};
use sffl_store::MAX_CHECKPOINT_WINDOW_SECS;

use crate::error::{HostError, HostResult};

fn default_max_log() -> usize {
    7
}

fn default_config_path() -> PathBuf {
    PathBuf::from("host/config/config.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

pub const DEFAULT_REGISTRY_PATH: &str = "host/config/registry.json";
pub const DEFAULT_QUORUM_THRESHOLD: QuorumThresholdPercentage = 67;
pub const DEFAULT_TIME_TO_EXPIRY_SECS: u64 = 60;
pub const DEFAULT_AGGREGATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 3600;
/// Upper bound on `time_to_expiry_secs` and `aggregation_timeout_secs`.
pub const MAX_ROUND_DURATION_SECS: u64 = 24 * 60 * 60;

/// Command line options. Node options left unset on the command line are
/// taken from the config file, then from the built-in defaults.
#[derive(Default, Clone, Serialize, Deserialize, Debug, Parser)]
#[command(
    name = "sffl-host",
    about = "The SFFL BLS aggregation node",
    long_about = None
)]
#[serde(default)]
pub struct Opts {
    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    /// Set the log level
    pub log_level: String,

    #[arg(long, require_equals = true)]
    /// Directory for daily-rotated JSON log files. Logs go to stdout when unset
    pub log_path: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "7")]
    #[serde(default = "default_max_log")]
    pub max_log: usize,

    #[arg(long, require_equals = true, default_value = "host/config/config.json")]
    #[serde(default = "default_config_path")]
    /// Path to a JSON file with node options. Command line values override it
    pub config_path: PathBuf,

    #[arg(long, require_equals = true)]
    /// Path to the operator registry snapshot
    /// [default: host/config/registry.json]
    pub registry_path: Option<PathBuf>,

    #[arg(long, require_equals = true)]
    /// Protocol version mixed into every domain separator
    /// [default: v0.1.0]
    pub protocol_version: Option<String>,

    #[arg(long, require_equals = true, value_delimiter = ',')]
    /// Quorums every round is validated against
    /// [default: 0]
    pub quorum_numbers: Option<Vec<QuorumNumber>>,

    #[arg(long, require_equals = true, value_delimiter = ',')]
    /// Signed stake percentage required per quorum, in quorum order
    /// [default: 67]
    pub quorum_thresholds: Option<Vec<QuorumThresholdPercentage>>,

    #[arg(long, require_equals = true)]
    /// Seconds a round may collect signatures before it expires
    /// [default: 60]
    pub time_to_expiry_secs: Option<u64>,

    #[arg(long, require_equals = true)]
    /// Seconds a round keeps collecting after reaching its threshold
    /// [default: 10]
    pub aggregation_timeout_secs: Option<u64>,

    #[arg(long, require_equals = true)]
    /// Seconds between checkpoint rounds
    /// [default: 3600]
    pub checkpoint_interval_secs: Option<u64>,
}

impl Opts {
    /// Read the options from a file and merge it with the current options.
    pub fn merge_from_file(&mut self) -> HostResult<()> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        let mut config: Value = serde_json::from_reader(reader)?;
        let this = serde_json::to_value(&self)?;
        merge(&mut config, &this);

        *self = serde_json::from_value(config)?;
        Ok(())
    }

    /// Fills in the defaults and checks the options are consistent.
    pub fn node_config(&self) -> HostResult<NodeConfig> {
        let protocol_version = protocol_version_from_str(
            self.protocol_version
                .as_deref()
                .unwrap_or(SfflHasher::DEFAULT_PROTOCOL_VERSION),
        )?;
        let quorum_numbers = self.quorum_numbers.clone().unwrap_or_else(|| vec![0]);
        let quorum_thresholds = self
            .quorum_thresholds
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_QUORUM_THRESHOLD; quorum_numbers.len()]);
        if quorum_numbers.is_empty() || quorum_numbers.len() != quorum_thresholds.len() {
            return Err(HostError::Config(format!(
                "{} quorum numbers but {} thresholds",
                quorum_numbers.len(),
                quorum_thresholds.len()
            )));
        }

        let time_to_expiry = self
            .time_to_expiry_secs
            .unwrap_or(DEFAULT_TIME_TO_EXPIRY_SECS);
        let aggregation_timeout = self
            .aggregation_timeout_secs
            .unwrap_or(DEFAULT_AGGREGATION_TIMEOUT_SECS);
        let checkpoint_interval = self
            .checkpoint_interval_secs
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_SECS);
        let round_durations = 1..=MAX_ROUND_DURATION_SECS;
        if !round_durations.contains(&time_to_expiry)
            || !round_durations.contains(&aggregation_timeout)
        {
            return Err(HostError::Config(format!(
                "round durations must be between 1 and {MAX_ROUND_DURATION_SECS} seconds"
            )));
        }
        if checkpoint_interval == 0 || checkpoint_interval > MAX_CHECKPOINT_WINDOW_SECS {
            return Err(HostError::Config(format!(
                "checkpoint interval must be between 1 and {MAX_CHECKPOINT_WINDOW_SECS} seconds"
            )));
        }

        Ok(NodeConfig {
            registry_path: self
                .registry_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH)),
            protocol_version,
            quorum_numbers,
            quorum_thresholds,
            time_to_expiry: Duration::from_secs(time_to_expiry),
            aggregation_timeout: Duration::from_secs(aggregation_timeout),
            checkpoint_interval: Duration::from_secs(checkpoint_interval),
        })
    }
}

/// Resolved node options.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NodeConfig {
    pub registry_path: PathBuf,
    pub protocol_version: B256,
    pub quorum_numbers: Vec<QuorumNumber>,
    pub quorum_thresholds: Vec<QuorumThresholdPercentage>,
    pub time_to_expiry: Duration,
    pub aggregation_timeout: Duration,
    pub checkpoint_interval: Duration,
}

/// Merges two json's together, overwriting `a` with the values of `b`
pub fn merge(a: &mut Value, b: &Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (a, b) if !b.is_null() => *a = b.clone(),
        // If b is null, just keep a (which means do nothing).
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_merge_keeps_values_missing_from_b() {
        let mut a = json!({"registry_path": "a.json", "quorum_numbers": [0], "nested": {"x": 1, "y": 2}});
        let b = json!({"registry_path": null, "quorum_numbers": [1, 2], "nested": {"y": 3}});
        merge(&mut a, &b);
        assert_eq!(
            a,
            json!({"registry_path": "a.json", "quorum_numbers": [1, 2], "nested": {"x": 1, "y": 3}})
        );
    }

    #[test]
    fn test_command_line_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"registry_path": "from_file.json", "time_to_expiry_secs": 30, "quorum_thresholds": [50]}}"#
        )
        .unwrap();

        let mut opts = Opts::parse_from([
            "sffl-host",
            &format!("--config-path={}", file.path().display()),
            "--time-to-expiry-secs=90",
        ]);
        opts.merge_from_file().unwrap();

        assert_eq!(opts.registry_path, Some(PathBuf::from("from_file.json")));
        assert_eq!(opts.time_to_expiry_secs, Some(90));
        assert_eq!(opts.quorum_thresholds, Some(vec![50]));
        assert_eq!(opts.config_path, file.path());
    }

    #[test]
    fn test_node_config_defaults() {
        let config = Opts::default().node_config().unwrap();
        assert_eq!(config.registry_path, PathBuf::from(DEFAULT_REGISTRY_PATH));
        assert_eq!(
            config.protocol_version,
            protocol_version_from_str(SfflHasher::DEFAULT_PROTOCOL_VERSION).unwrap()
        );
        assert_eq!(config.quorum_numbers, vec![0]);
        assert_eq!(config.quorum_thresholds, vec![DEFAULT_QUORUM_THRESHOLD]);
        assert_eq!(config.time_to_expiry, Duration::from_secs(60));
        assert_eq!(config.aggregation_timeout, Duration::from_secs(10));
        assert_eq!(config.checkpoint_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_node_config_rejects_inconsistent_options() {
        let mismatched = Opts {
            quorum_numbers: Some(vec![0, 1]),
            quorum_thresholds: Some(vec![67]),
            ..Default::default()
        };
        assert!(matches!(mismatched.node_config(), Err(HostError::Config(_))));

        let endless_round = Opts {
            time_to_expiry_secs: Some(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(endless_round.node_config(), Err(HostError::Config(_))));

        let zero_timeout = Opts {
            aggregation_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero_timeout.node_config(), Err(HostError::Config(_))));

        let long_interval = Opts {
            checkpoint_interval_secs: Some(MAX_CHECKPOINT_WINDOW_SECS + 1),
            ..Default::default()
        };
        assert!(matches!(long_interval.node_config(), Err(HostError::Config(_))));

        let long_version = Opts {
            protocol_version: Some("v".repeat(33)),
            ..Default::default()
        };
        assert!(matches!(long_version.node_config(), Err(HostError::Hash(_))));
    }
}
