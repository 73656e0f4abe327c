use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{EventBusError, EventBusResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    /// Re-raise handler failures to the caller of the outermost `post`.
    #[serde(default)]
    pub throw_subscriber_exception: bool,

    #[serde(default = "default_true")]
    pub log_subscriber_exceptions: bool,

    #[serde(default = "default_true")]
    pub log_no_subscriber_messages: bool,

    #[serde(default = "default_true")]
    pub send_subscriber_exception_event: bool,

    #[serde(default = "default_true")]
    pub send_no_subscriber_event: bool,

    /// Match subscriptions against the posted type's interfaces and ancestors too.
    #[serde(default = "default_true")]
    pub event_inheritance: bool,

    /// Subscriber type names (as reported by `std::any::type_name`) whose
    /// handler names are not verified.
    #[serde(default)]
    pub skip_method_verification_for: Vec<String>,

    #[serde(default = "default_main_thread_budget", with = "duration_ms")]
    pub main_thread_budget: Duration,

    #[serde(default = "default_pending_post_pool_size")]
    pub pending_post_pool_size: usize,

    /// Worker threads of the default pool, `None` lets tokio decide.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            throw_subscriber_exception: false,
            log_subscriber_exceptions: default_true(),
            log_no_subscriber_messages: default_true(),
            send_subscriber_exception_event: default_true(),
            send_no_subscriber_event: default_true(),
            event_inheritance: default_true(),
            skip_method_verification_for: Vec::new(),
            main_thread_budget: default_main_thread_budget(),
            pending_post_pool_size: default_pending_post_pool_size(),
            worker_threads: None,
        }
    }
}

impl BusConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> EventBusResult<Self> {
        from_file(path)
    }

    pub fn skips_verification(&self, type_name: &str) -> bool {
        self.skip_method_verification_for
            .iter()
            .any(|name| name == type_name)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> EventBusResult<T> {
    let file = File::open(path)
        .map_err(|e| EventBusError::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| EventBusError::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> EventBusResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| EventBusError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_true() -> bool {
    true
}

fn default_main_thread_budget() -> Duration {
    Duration::from_millis(10)
}

fn default_pending_post_pool_size() -> usize {
    10_000
}

// Durations travel as milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert!(config.event_inheritance);
        assert!(config.send_no_subscriber_event);
        assert!(!config.throw_subscriber_exception);
        assert_eq!(config.main_thread_budget, Duration::from_millis(10));
        assert_eq!(config.pending_post_pool_size, 10_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BusConfig = from_str(
            r#"{ "event_inheritance": false, "main_thread_budget": 25,
                 "skip_method_verification_for": ["app::Legacy"] }"#,
        )
        .unwrap();
        assert!(!config.event_inheritance);
        assert!(config.log_subscriber_exceptions);
        assert_eq!(config.main_thread_budget, Duration::from_millis(25));
        assert!(config.skips_verification("app::Legacy"));
        assert!(!config.skips_verification("app::Other"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "throw_subscriber_exception": true }}"#).unwrap();
        let config = BusConfig::from_file(file.path()).unwrap();
        assert!(config.throw_subscriber_exception);
        assert_eq!(config.worker_threads, None);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let result: EventBusResult<BusConfig> = from_str("{ not json");
        assert!(matches!(result, Err(EventBusError::Config(_))));
    }
}
