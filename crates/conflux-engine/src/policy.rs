use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the engine does when a node's tool call fails.
///
/// Applies to handler-reported failures and timeouts; schema mismatches,
/// mapping errors, and routing errors always fail the run. Exhausted
/// retries degrade to `FailRun`. Every failed attempt emits NODE_FAILED
/// regardless of which policy fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the run on the first tool failure (the default).
    #[default]
    FailRun,
    /// Retry the call up to `max_attempts` total attempts with backoff.
    Retry {
        max_attempts: u32,
        #[serde(default)]
        backoff: RetryBackoff,
    },
    /// Abandon the node and route directly to another node.
    SkipTo { node: String },
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoff {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 30_000 }

/// Delay before retry attempt `attempt` (0-based).
pub fn backoff_delay(attempt: u32, config: &RetryBackoff) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt.min(16))).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fail_run() {
        assert!(matches!(FailurePolicy::default(), FailurePolicy::FailRun));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryBackoff {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        let first = backoff_delay(0, &config);
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));

        let capped = backoff_delay(10, &config);
        assert!(capped <= Duration::from_millis(1_200));
    }

    #[test]
    fn test_policy_serde() {
        let json = r#"{"type": "retry", "max_attempts": 3}"#;
        let policy: FailurePolicy = serde_json::from_str(json).unwrap();
        match policy {
            FailurePolicy::Retry {
                max_attempts,
                backoff,
            } => {
                assert_eq!(max_attempts, 3);
                assert_eq!(backoff.initial_backoff_ms, 500);
            }
            other => panic!("expected retry, got {other:?}"),
        }

        let json = r#"{"type": "skip_to", "node": "fallback"}"#;
        let policy: FailurePolicy = serde_json::from_str(json).unwrap();
        assert!(matches!(policy, FailurePolicy::SkipTo { node } if node == "fallback"));
    }
}
