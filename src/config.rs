use std::{fs, path::Path};

use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// replay config
    pub replay: ReplayConfig,
    /// capture config
    pub capture: CaptureConfig,
    /// selector resolution config
    pub selector: SelectorConfig,
    /// store config
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// speed multiplier used when a replay does not pick one, must be > 0
    pub default_speed: f64,
    /// keep going after a step whose element cannot be found
    pub continue_on_error: bool,
    /// upper bound for a single captured inter-step gap, in milliseconds
    pub max_step_wait_ms: u64,
    /// capacity of the replay command queue
    pub command_queue_size: usize,
    /// capacity of the async replay status stream
    pub status_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// number of structural mutations kept for undo
    pub history_limit: usize,
    /// number of clipboard copies remembered for paste data-flow
    pub clipboard_history: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// maximum number of shadow boundaries crossed while building a path
    pub max_shadow_depth: usize,
    /// maximum number of class names combined into one compound selector
    pub max_class_names: usize,
    /// minimum length of a lowercase alphanumeric token treated as hashed
    pub hashed_token_min_len: usize,
    /// only treat a token as hashed when it also contains a digit
    pub hashed_token_require_digit: bool,
    /// longest visible text used for a text match
    pub max_text_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// store type
    pub store_type: StoreType,
    /// directory of the file store
    pub path: Option<String>,
    /// persist the process after every graph change
    pub autosave: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
    File,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            default_speed: 1.0,
            continue_on_error: false,
            max_step_wait_ms: 30_000,
            command_queue_size: 64,
            status_queue_size: 1024,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Mem,
            path: None,
            autosave: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            clipboard_history: 20,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_shadow_depth: 10,
            max_class_names: 2,
            hashed_token_min_len: 6,
            hashed_token_require_digit: true,
            max_text_len: 64,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.replay.default_speed.is_finite() && self.replay.default_speed > 0.0) {
            return Err(crate::ReplayflowError::Config(format!("replay.default_speed must be > 0, got {}", self.replay.default_speed)));
        }
        if self.store.store_type == StoreType::File && self.store.path.is_none() {
            return Err(crate::ReplayflowError::Config("store.path is required when store type is file".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, StoreType};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        [replay]
        default_speed = 2.0
        continue_on_error = true

        [selector]
        hashed_token_require_digit = false

        [store]
        store_type = "file"
        path = "/tmp/replayflow"
        autosave = false
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.replay.default_speed, 2.0);
        assert!(config.replay.continue_on_error);
        assert_eq!(config.replay.max_step_wait_ms, 30_000);
        assert!(!config.selector.hashed_token_require_digit);
        assert_eq!(config.selector.max_shadow_depth, 10);
        assert_eq!(config.capture.history_limit, 50);
        assert_eq!(config.store.store_type, StoreType::File);
        assert!(!config.store.autosave);
        assert_eq!(config.store.path.unwrap(), "/tmp/replayflow");
    }

    #[test]
    fn test_config_empty_uses_defaults() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.replay.default_speed, 1.0);
        assert_eq!(config.store.store_type, StoreType::Mem);
        assert!(config.store.autosave);
        assert_eq!(config.capture.clipboard_history, 20);
    }

    #[test]
    fn test_config_rejects_bad_speed() {
        assert!(Config::load_from_str("[replay]\ndefault_speed = 0.0").is_err());
        assert!(Config::load_from_str("[store]\nstore_type = \"file\"").is_err());
    }
}
