//! Runtime configuration.
//!
//! Layers, lowest priority first: built-in defaults, the project's
//! `settings` section, `DF_*` environment variables, then whatever the
//! caller (the CLI) sets explicitly.

use df_project::SettingsDef;

pub const DEFAULT_TRANSACTION_NAME: &str = "Dynaflow run";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Every edit or external change requests a run.
    pub dynamic_run: bool,
    /// Evaluate on the mutation context and tag transactions as Debug.
    pub debug: bool,
    pub transaction_name: String,
    /// Log each compiled expression before evaluating it.
    pub log_expressions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dynamic_run: false,
            debug: false,
            transaction_name: DEFAULT_TRANSACTION_NAME.to_string(),
            log_expressions: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_settings(settings: &SettingsDef) -> Self {
        let mut config = Self {
            dynamic_run: settings.dynamic_run,
            debug: settings.debug,
            ..Self::default()
        };
        if let Some(name) = &settings.transaction_name {
            config.transaction_name = name.clone();
        }
        config
    }

    pub fn to_settings(&self) -> SettingsDef {
        SettingsDef {
            dynamic_run: self.dynamic_run,
            debug: self.debug,
            transaction_name: (self.transaction_name != DEFAULT_TRANSACTION_NAME)
                .then(|| self.transaction_name.clone()),
        }
    }

    /// Apply `DF_DEBUG` and `DF_DYNAMIC_RUN` from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("DF_DEBUG").and_then(|v| parse_flag("DF_DEBUG", &v)) {
            self.debug = value;
        }
        if let Some(value) = lookup("DF_DYNAMIC_RUN").and_then(|v| parse_flag("DF_DYNAMIC_RUN", &v)) {
            self.dynamic_run = value;
        }
        self
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        other => {
            tracing::warn!(key, value = other, "ignoring unrecognised flag value");
            None
        }
    }
}
