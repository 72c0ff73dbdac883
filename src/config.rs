use anyhow::{bail, Context};

use crate::chunk::DEFAULT_MAX_MESSAGE_LEN;
use crate::models::ReportShape;

pub const MAX_MESSAGE_LEN_VAR: &str = "SHEET_REPORT_MAX_MESSAGE_LEN";
pub const DEFAULT_MODE_VAR: &str = "SHEET_REPORT_DEFAULT_MODE";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_message_len: usize,
    /// Mode applied to one-shot reports when `--mode` is not given.
    pub default_mode: Option<ReportShape>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            default_mode: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Some(value) = lookup(MAX_MESSAGE_LEN_VAR) {
            config.max_message_len = value
                .trim()
                .parse()
                .with_context(|| format!("{MAX_MESSAGE_LEN_VAR} must be a positive integer"))?;
            if config.max_message_len == 0 {
                bail!("{MAX_MESSAGE_LEN_VAR} must be a positive integer");
            }
        }

        if let Some(value) = lookup(DEFAULT_MODE_VAR).filter(|value| !value.trim().is_empty()) {
            let shape = value
                .parse::<ReportShape>()
                .with_context(|| format!("{DEFAULT_MODE_VAR} is not a known mode"))?;
            config.default_mode = Some(shape);
        }

        Ok(config)
    }

    pub fn with_overrides(mut self, max_len: Option<usize>, mode: Option<ReportShape>) -> Self {
        if let Some(max_len) = max_len {
            self.max_message_len = max_len.max(1);
        }
        if mode.is_some() {
            self.default_mode = mode;
        }
        self
    }
}
