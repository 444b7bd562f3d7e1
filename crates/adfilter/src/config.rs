use std::time::Duration;

use crate::rewriter::DEFAULT_AD_KEYWORD;

/// Ad-filtering switches consumed from user settings.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Master switch for ad excision across all backends.
    pub enabled: bool,
    /// Case-sensitive substrings that mark a playlist line as advertisement.
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// The keyword list with the built-in fallback applied.
    pub fn effective_keywords(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            vec![DEFAULT_AD_KEYWORD.to_string()]
        } else {
            self.keywords.clone()
        }
    }
}

/// Tuning knobs passed through to the intercepting software engine.
/// Opaque to the core: the engine interprets them, we only carry them.
#[derive(Debug, Clone)]
pub struct InterceptingTuning {
    /// Forward buffer target the engine should maintain.
    pub max_buffer_length: Duration,
    /// Upper bound on buffered media bytes.
    pub max_buffer_size_bytes: usize,
    /// Retries of the engine's own manifest loader.
    pub manifest_load_max_retries: u32,
    pub manifest_load_timeout: Duration,
    /// Retries of the engine's own fragment loader.
    pub fragment_load_max_retries: u32,
    pub fragment_load_timeout: Duration,
}

impl Default for InterceptingTuning {
    fn default() -> Self {
        Self {
            max_buffer_length: Duration::from_secs(30),
            max_buffer_size_bytes: 60 * 1024 * 1024, // 60MB
            manifest_load_max_retries: 3,
            manifest_load_timeout: Duration::from_secs(10),
            fragment_load_max_retries: 3,
            fragment_load_timeout: Duration::from_secs(20),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub tuning: InterceptingTuning,
    /// Timeout for each manifest fetch during tree resolution.
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            tuning: InterceptingTuning::default(),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}
