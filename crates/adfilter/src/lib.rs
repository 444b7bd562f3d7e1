// HLS manifest ad-filtering and playback-session engine.
//
// A pure line-level rewriter strips advertisement segments out of playlists;
// a resolver pre-fetches and rewrites whole manifest trees for backends with
// no interception hook; a session controller drives one playback attempt at
// a time over an external decoder with bounded failure recovery.

pub mod backend;
pub mod config;
pub mod error;
pub mod fetch;
pub mod recovery;
pub mod registry;
pub mod resolver;
pub mod rewriter;
pub mod session;

// Re-exports for ease of use
pub use backend::{
    AutoplayDenied, BackendCapabilities, BackendEvent, BackendFactory, ErrorCategory,
    FilteringLoader, LoadContext, ManifestLoader, PlayerBackend, RenderTarget, RequestKind,
    VariantInfo,
};
pub use config::{EngineConfig, FilterConfig, InterceptingTuning};
pub use error::EngineError;
pub use fetch::{HttpManifestFetcher, ManifestFetcher};
pub use recovery::{FatalKind, FatalReport, RecoveryAction, RecoveryPolicy, MAX_FATAL_RETRIES};
pub use registry::{Artifact, ArtifactRegistry};
pub use resolver::{ManifestResolver, ResolvedManifest};
pub use rewriter::{ManifestRewriter, DEFAULT_AD_KEYWORD};
pub use session::{BackendChoice, SessionController, SessionEvent, SessionState};
