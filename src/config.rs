//! Configuration for the deferred binding.

use crate::classify::{ClassFilter, DEFAULT_TENSOR_CLASSES, TENSOR_TAG};
use crate::error::{BindError, Result};

/// Overrides the interpreter used to look for the module.
pub const ENV_PYTHON_OVERRIDE: &str = "TENSORFLOW_PYTHON";

/// Native log verbosity to hand to TensorFlow's C++ runtime.
pub const ENV_LOG_LEVEL: &str = "TFBRIDGE_LOG_LEVEL";

/// TensorFlow's own native log-verbosity variable.
pub const NATIVE_LOG_VAR: &str = "TF_CPP_MIN_LOG_LEVEL";

/// Highest accepted native log level.
pub const MAX_LOG_LEVEL: u8 = 1;

/// Configuration for a [`crate::Binding`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingConfig {
    /// Name of the foreign module to import.
    pub module: String,

    /// Import priority handed to the interop runtime.
    pub priority: u32,

    /// Name of the runtime environment the module is expected in.
    pub environment: String,

    /// Interpreter whose environment is searched for the module, handed to
    /// [`crate::interop::Interop::select_interpreter`] before the first
    /// import.
    pub interpreter_override: Option<String>,

    /// Native log level (0..=1) forwarded to [`NATIVE_LOG_VAR`].
    pub log_level: Option<u8>,

    /// Tag prepended to tensor-like values.
    pub tensor_tag: String,

    /// Foreign type tags considered tensor-like.
    pub tensor_classes: Vec<String>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            module: "tensorflow".to_string(),
            priority: 5,
            environment: "tensorflow".to_string(),
            interpreter_override: None,
            log_level: None,
            tensor_tag: TENSOR_TAG.to_string(),
            tensor_classes: DEFAULT_TENSOR_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BindingConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden from `lookup`.
    ///
    /// An empty override is ignored. A log level that is not an integer is
    /// an error; integers are clamped to `0..=MAX_LOG_LEVEL`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(python) = lookup(ENV_PYTHON_OVERRIDE).filter(|v| !v.is_empty()) {
            config.interpreter_override = Some(python);
        }

        if let Some(raw) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            let level: i64 = raw.trim().parse().map_err(|_| {
                BindError::Config(format!("{ENV_LOG_LEVEL} must be an integer, got {raw:?}"))
            })?;
            config.log_level = Some(level.clamp(0, MAX_LOG_LEVEL as i64) as u8);
        }

        Ok(config)
    }

    /// Set the module name.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Set the import priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the target environment name.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the interpreter override.
    pub fn with_interpreter(mut self, python: impl Into<String>) -> Self {
        self.interpreter_override = Some(python.into());
        self
    }

    /// Set the native log level, clamped to `0..=MAX_LOG_LEVEL`.
    pub fn with_log_level(mut self, level: u8) -> Self {
        self.log_level = Some(level.min(MAX_LOG_LEVEL));
        self
    }

    /// Replace the tensor-like class set.
    pub fn with_tensor_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tensor_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn class_filter(&self) -> ClassFilter {
        ClassFilter::new(self.tensor_tag.clone(), self.tensor_classes.iter().cloned())
    }

    /// Variables to set before the first import, given the current
    /// environment.
    ///
    /// The native log level is only forwarded when the user has not set
    /// [`NATIVE_LOG_VAR`] themselves.
    pub fn env_forwarding<F>(&self, current: F) -> Vec<(String, String)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vec::new();
        if let Some(level) = self.log_level {
            if current(NATIVE_LOG_VAR).is_none() {
                vars.push((NATIVE_LOG_VAR.to_string(), level.to_string()));
            }
        }
        vars
    }

    /// Apply [`Self::env_forwarding`] to the process environment.
    pub fn apply_env(&self) {
        for (key, value) in self.env_forwarding(|key| std::env::var(key).ok()) {
            tracing::debug!("forwarding {}={}", key, value);
            std::env::set_var(&key, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.module, "tensorflow");
        assert_eq!(config.priority, 5);
        assert!(config.interpreter_override.is_none());
        assert!(config.log_level.is_none());
        assert_eq!(config.tensor_classes.len(), DEFAULT_TENSOR_CLASSES.len());
    }

    #[test]
    fn reads_override_and_log_level() {
        let config = BindingConfig::from_lookup(lookup(&[
            (ENV_PYTHON_OVERRIDE, "/opt/py/bin/python"),
            (ENV_LOG_LEVEL, "0"),
        ]))
        .unwrap();
        assert_eq!(config.interpreter_override.as_deref(), Some("/opt/py/bin/python"));
        assert_eq!(config.log_level, Some(0));
    }

    #[test]
    fn log_level_is_clamped() {
        let high = BindingConfig::from_lookup(lookup(&[(ENV_LOG_LEVEL, "3")])).unwrap();
        assert_eq!(high.log_level, Some(1));
        let low = BindingConfig::from_lookup(lookup(&[(ENV_LOG_LEVEL, "-2")])).unwrap();
        assert_eq!(low.log_level, Some(0));
        assert_eq!(BindingConfig::new().with_log_level(9).log_level, Some(1));
    }

    #[test]
    fn bad_log_level_is_an_error() {
        let err = BindingConfig::from_lookup(lookup(&[(ENV_LOG_LEVEL, "loud")])).unwrap_err();
        assert!(matches!(err, BindError::Config(_)));
    }

    #[test]
    fn empty_override_is_ignored() {
        let config = BindingConfig::from_lookup(lookup(&[(ENV_PYTHON_OVERRIDE, "")])).unwrap();
        assert!(config.interpreter_override.is_none());
    }

    #[test]
    fn forwarding_respects_existing_native_level() {
        let config = BindingConfig::new()
            .with_interpreter("/opt/py/bin/python")
            .with_log_level(1);

        let fresh = config.env_forwarding(lookup(&[]));
        assert_eq!(fresh, vec![(NATIVE_LOG_VAR.to_string(), "1".to_string())]);

        let preset = config.env_forwarding(lookup(&[(NATIVE_LOG_VAR, "3")]));
        assert!(preset.is_empty());
    }

    #[test]
    fn nothing_to_forward_by_default() {
        assert!(BindingConfig::new().env_forwarding(lookup(&[])).is_empty());
        let with_override = BindingConfig::new().with_interpreter("/opt/py/bin/python");
        assert!(with_override.env_forwarding(lookup(&[])).is_empty());
    }

    #[test]
    fn class_filter_uses_configured_set() {
        let filter = BindingConfig::new()
            .with_tensor_classes(["my.Tensor"])
            .class_filter();
        assert_eq!(filter.apply(&["my.Tensor"]), vec![TENSOR_TAG, "my.Tensor"]);
    }
}
