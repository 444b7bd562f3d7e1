use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("manifest fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("playback capability unsupported: {reason}")]
    CapabilityUnsupported { reason: String },

    #[error("backend error: {reason}")]
    Backend { reason: String },
}

impl EngineError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn capability_unsupported(reason: impl Into<String>) -> Self {
        Self::CapabilityUnsupported {
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Per-node fetch faults are absorbed by the resolver's degraded
    /// fallback; everything else propagates.
    pub fn is_fetch_class(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::HttpStatus { .. } | Self::FetchFailed { .. }
        )
    }
}
