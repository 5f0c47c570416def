use std::path::PathBuf;
use std::time::Duration;

use waypoint_scheduler::RuntimeConfig;

/// Everything the engine needs to boot, merged from environment
/// variables over built-in defaults. `tandem-core::config::ConfigStore`
/// layers global/project/managed/env/cli files on top of each other;
/// this is the same idea scoped down to the one layer this service
/// actually needs, since multi-tenant config management is out of
/// scope here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub hostname: String,
    pub port: u16,
    pub state_dir: PathBuf,
    pub fixtures_dir: PathBuf,
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    pub fn load(hostname: Option<String>, port: Option<u16>, state_dir: Option<String>) -> Self {
        let hostname = hostname
            .or_else(|| env_string("WAYPOINT_HOST"))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = port
            .or_else(|| env_string("WAYPOINT_PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(4000);
        let state_dir = state_dir
            .or_else(|| env_string("WAYPOINT_STATE_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".waypoint"));
        let fixtures_dir = env_string("WAYPOINT_FIXTURES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join("fixtures"));

        let runtime = RuntimeConfig {
            per_agent_timeout: Duration::from_secs(env_u64("WAYPOINT_AGENT_TIMEOUT_SECS", 45)),
            run_deadline: Duration::from_secs(env_u64("WAYPOINT_RUN_DEADLINE_SECS", 600)),
            reconciliation_cap: env_u64("WAYPOINT_RECONCILIATION_CAP", 3) as u32,
            token_budget: env_string("WAYPOINT_TOKEN_BUDGET").and_then(|v| v.parse().ok()),
        };

        Self {
            hostname,
            port,
            state_dir,
            fixtures_dir,
            runtime,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "WAYPOINT_HOST",
            "WAYPOINT_PORT",
            "WAYPOINT_STATE_DIR",
            "WAYPOINT_FIXTURES_DIR",
            "WAYPOINT_AGENT_TIMEOUT_SECS",
            "WAYPOINT_RUN_DEADLINE_SECS",
            "WAYPOINT_RECONCILIATION_CAP",
            "WAYPOINT_TOKEN_BUDGET",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_nothing_is_set() {
        clear_env();
        let config = EngineConfig::load(None, None, None);
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.state_dir, PathBuf::from(".waypoint"));
        assert_eq!(config.fixtures_dir, PathBuf::from(".waypoint/fixtures"));
        assert_eq!(config.runtime.reconciliation_cap, 3);
        assert_eq!(config.runtime.token_budget, None);
    }

    #[test]
    #[serial]
    fn explicit_argument_wins_over_environment_variable() {
        clear_env();
        std::env::set_var("WAYPOINT_PORT", "9999");
        let config = EngineConfig::load(None, Some(4242), None);
        assert_eq!(config.port, 4242);
        clear_env();
    }

    #[test]
    #[serial]
    fn environment_variable_applies_when_no_argument_given() {
        clear_env();
        std::env::set_var("WAYPOINT_STATE_DIR", "/tmp/waypoint-test-state");
        let config = EngineConfig::load(None, None, None);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/waypoint-test-state"));
        assert_eq!(
            config.fixtures_dir,
            PathBuf::from("/tmp/waypoint-test-state/fixtures")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn fixtures_dir_override_takes_precedence_over_state_dir_derivation() {
        clear_env();
        std::env::set_var("WAYPOINT_FIXTURES_DIR", "/tmp/waypoint-fixtures-override");
        let config = EngineConfig::load(None, None, Some("/tmp/waypoint-state".to_string()));
        assert_eq!(
            config.fixtures_dir,
            PathBuf::from("/tmp/waypoint-fixtures-override")
        );
        clear_env();
    }
}
