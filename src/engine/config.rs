//! Per-trial navigation configuration.
//!
//! Immutable for the duration of one run. Every field has a default, so a
//! JSON trial definition only needs `pages`.

use std::fmt;
use std::path::Path;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of content shown during one Viewing state. Never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Page(pub String);

impl Page {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn content(&self) -> &str {
        &self.0
    }
}

/// Minimum dwell time before a page can be left
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayTime {
    /// Same delay for every page
    Uniform(u64),
    /// One delay per page; pages past the end get 0
    PerPage(Vec<u64>),
}

impl Default for DelayTime {
    fn default() -> Self {
        DelayTime::Uniform(0)
    }
}

impl DelayTime {
    pub fn for_page(&self, page_index: usize) -> u64 {
        match self {
            DelayTime::Uniform(ms) => *ms,
            DelayTime::PerPage(seq) => seq.get(page_index).copied().unwrap_or(0),
        }
    }

    pub fn max(&self) -> u64 {
        match self {
            DelayTime::Uniform(ms) => *ms,
            DelayTime::PerPage(seq) => seq.iter().copied().max().unwrap_or(0),
        }
    }
}

fn sanitize_ms(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.round() as u64
    } else {
        0
    }
}

fn lenient_ms(v: &Value) -> u64 {
    match v {
        Value::Number(n) => n.as_f64().map(sanitize_ms).unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(sanitize_ms).unwrap_or(0),
        _ => 0,
    }
}

impl<'de> Deserialize<'de> for DelayTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match &raw {
            Value::Array(items) => DelayTime::PerPage(items.iter().map(lenient_ms).collect()),
            other => DelayTime::Uniform(lenient_ms(other)),
        })
    }
}

impl Serialize for DelayTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DelayTime::Uniform(ms) => serializer.serialize_u64(*ms),
            DelayTime::PerPage(seq) => seq.serialize(serializer),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EmptyPages,
    Parse(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyPages => write!(f, "page sequence is empty"),
            ConfigError::Parse(err) => write!(f, "invalid navigation config: {}", err),
            ConfigError::Io(err) => write!(f, "cannot read navigation config: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::EmptyPages => None,
            ConfigError::Parse(err) => Some(err),
            ConfigError::Io(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub pages: Vec<Page>,
    /// Key that advances to the next page
    pub key_forward: String,
    /// Key that returns to the previous page
    pub key_backward: String,
    pub allow_backward: bool,
    pub allow_keys: bool,
    /// Render Previous/Next buttons beneath each page
    pub show_clickable_nav: bool,
    /// Show "Page x/y" (only when there is more than one page)
    pub show_page_number: bool,
    pub page_label: String,
    pub button_label_previous: String,
    pub button_label_next: String,
    pub delay_time: DelayTime,
    /// Compare key identifiers exactly instead of ignoring case
    pub case_sensitive_keys: bool,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            key_forward: "ArrowRight".to_string(),
            key_backward: "ArrowLeft".to_string(),
            allow_backward: true,
            allow_keys: true,
            show_clickable_nav: false,
            show_page_number: false,
            page_label: "Page".to_string(),
            button_label_previous: "Previous".to_string(),
            button_label_next: "Next".to_string(),
            delay_time: DelayTime::default(),
            case_sensitive_keys: false,
        }
    }
}

impl NavConfig {
    pub fn with_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Page::new).collect(),
            ..Default::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: NavConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pages.is_empty() {
            return Err(ConfigError::EmptyPages);
        }
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn delay_for(&self, page_index: usize) -> u64 {
        self.delay_time.for_page(page_index)
    }

    /// True when neither keys nor buttons can move the trial forward
    pub fn has_no_input_channel(&self) -> bool {
        !self.allow_keys && !self.show_clickable_nav
    }

    pub fn valid_keys(&self) -> Vec<String> {
        vec![self.key_forward.clone(), self.key_backward.clone()]
    }

    pub fn keys_match(&self, pressed: &str, expected: &str) -> bool {
        if self.case_sensitive_keys {
            pressed == expected
        } else {
            pressed.eq_ignore_ascii_case(expected)
        }
    }
}
