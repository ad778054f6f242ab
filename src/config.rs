//! Plain-struct configuration for the scheduler, executor, and heartbeat
//! subsystems, grounded on the teacher's `DatabaseConfig` (formerly
//! `src/metadata.rs`) `Default`-plus-`from_env` pattern but split one
//! struct per component rather than one monolithic config, matching
//! SPEC_FULL.md's ambient-stack section.

use std::time::Duration;

/// Caps the scheduler owns directly: how many jobs can be live at once
/// and how many candidate endpoints a task retry is allowed to walk
/// through before giving up (§4.7 "candidate node addresses").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_job_num: usize,
    pub max_candidate_eps: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_job_num: 10_000, max_candidate_eps: 8 }
    }
}

impl SchedulerConfig {
    /// Overlay non-default environment values onto `self`, matching the
    /// teacher's `DatabaseConfig::from_env`/`merge` shape. Unset or
    /// unparseable variables leave the existing field untouched.
    pub fn merge_env(mut self) -> Self {
        if let Some(v) = parse_env("RUSTYDB_SCHED_MAX_JOB_NUM") {
            self.max_job_num = v;
        }
        if let Some(v) = parse_env("RUSTYDB_SCHED_MAX_CANDIDATE_EPS") {
            self.max_candidate_eps = v;
        }
        self
    }
}

/// Caps the executor/operator tree owns: how many in-flight data blocks a
/// single query's sink may buffer (§6.2) and how many live time windows
/// an interval/session/state-window operator may hold open at once
/// (§4.4's out-of-order guard).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_data_block_num_per_query: usize,
    pub max_time_windows: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_data_block_num_per_query: crate::sink::DEFAULT_MAX_BLOCKS_PER_QUERY,
            max_time_windows: crate::execution::interval::DEFAULT_MAX_TIME_WINDOWS,
        }
    }
}

impl ExecutorConfig {
    pub fn merge_env(mut self) -> Self {
        if let Some(v) = parse_env("RUSTYDB_EXEC_MAX_BLOCKS_PER_QUERY") {
            self.max_data_block_num_per_query = v;
        }
        if let Some(v) = parse_env("RUSTYDB_EXEC_MAX_TIME_WINDOWS") {
            self.max_time_windows = v;
        }
        self
    }
}

/// Caps and timing the client heartbeat pipeline owns: the background
/// worker's tick interval (§4.8 "fixed interval (1.5s)") and how long a
/// connection may go without a heartbeat before it's considered idle and
/// evicted from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub heartbeat_interval_ms: u64,
    pub max_idle_duration_sec: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { heartbeat_interval_ms: 1500, max_idle_duration_sec: 90 }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn max_idle_duration(&self) -> Duration {
        Duration::from_secs(self.max_idle_duration_sec)
    }

    pub fn merge_env(mut self) -> Self {
        if let Some(v) = parse_env("RUSTYDB_HB_INTERVAL_MS") {
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = parse_env("RUSTYDB_HB_MAX_IDLE_SEC") {
            self.max_idle_duration_sec = v;
        }
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_config_defaults_match_component_constants() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.max_data_block_num_per_query, crate::sink::DEFAULT_MAX_BLOCKS_PER_QUERY);
        assert_eq!(cfg.max_time_windows, crate::execution::interval::DEFAULT_MAX_TIME_WINDOWS);
    }

    #[test]
    fn heartbeat_config_converts_to_durations() {
        let cfg = HeartbeatConfig::default();
        assert_eq!(cfg.interval(), Duration::from_millis(1500));
        assert_eq!(cfg.max_idle_duration(), Duration::from_secs(90));
    }
}
