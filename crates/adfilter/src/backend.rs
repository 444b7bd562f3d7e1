// Backend capability contract. The decoding engines themselves are external
// black boxes; this module only defines the seams the session drives.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::InterceptingTuning;
use crate::error::EngineError;
use crate::rewriter::ManifestRewriter;

/// Fault class reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Media,
    Other,
}

/// One variant stream as declared by the parsed master manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    /// Declared codec identifiers, e.g. `avc1.64001f,mp4a.40.2`.
    pub codecs: Option<String>,
    pub bandwidth: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Error {
        category: ErrorCategory,
        fatal: bool,
        detail: Option<String>,
    },
    /// First media segment at stream-start has loaded.
    FirstSegmentLoaded,
    /// Stream metadata parsed; carries the declared variants.
    ManifestParsed { variants: Vec<VariantInfo> },
}

/// Request class seen by the interception hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    MasterManifest,
    VariantManifest,
    Other,
}

impl RequestKind {
    pub fn is_manifest(self) -> bool {
        !matches!(self, RequestKind::Other)
    }
}

#[derive(Debug, Clone)]
pub struct LoadContext {
    pub url: String,
    pub kind: RequestKind,
}

/// The engine's pluggable network layer. Decoration point for filtering.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    async fn load(&self, ctx: &LoadContext) -> Result<String, EngineError>;
}

/// Decorates an inner loader, rewriting manifest-class response bodies
/// before the engine parses them. Non-manifest requests pass through.
pub struct FilteringLoader {
    inner: Arc<dyn ManifestLoader>,
    rewriter: ManifestRewriter,
}

impl FilteringLoader {
    pub fn new(inner: Arc<dyn ManifestLoader>, rewriter: ManifestRewriter) -> Self {
        Self { inner, rewriter }
    }
}

#[async_trait]
impl ManifestLoader for FilteringLoader {
    async fn load(&self, ctx: &LoadContext) -> Result<String, EngineError> {
        let body = self.inner.load(ctx).await?;
        if ctx.kind.is_manifest() {
            Ok(self.rewriter.rewrite(&body, &ctx.url))
        } else {
            Ok(body)
        }
    }
}

/// Rendering surface handle. Opaque to the core.
#[derive(Debug, Clone, Default)]
pub struct RenderTarget {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Software adaptive-bitrate engine with a network interception hook.
    pub intercepting: bool,
    /// Platform-native decoder, no interception hook.
    pub native: bool,
}

/// Playback start was denied by the environment.
#[derive(Debug, Clone, thiserror::Error)]
#[error("autoplay denied: {cause}")]
pub struct AutoplayDenied {
    pub cause: String,
}

/// One playback engine instance: load, attach, run, destroy.
#[async_trait]
pub trait PlayerBackend: Send {
    async fn load_source(&mut self, url: &str) -> Result<(), EngineError>;

    fn attach(&mut self, target: &RenderTarget);

    /// Resume loading after a network-class fault. Does not recreate
    /// the engine.
    async fn start_load(&mut self);

    /// Attempt media-error recovery in place.
    async fn recover_media(&mut self);

    /// Attempt to begin playback.
    async fn play(&mut self) -> Result<(), AutoplayDenied>;

    /// Take the event feed. Yields `None` if already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<BackendEvent>>;

    async fn destroy(&mut self);
}

/// Environment probe and constructor for the available backends.
pub trait BackendFactory: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// The software engine's default network loader, before decoration.
    fn base_loader(&self) -> Arc<dyn ManifestLoader>;

    fn create_intercepting(
        &self,
        tuning: &InterceptingTuning,
        loader: Arc<dyn ManifestLoader>,
    ) -> Result<Box<dyn PlayerBackend>, EngineError>;

    fn create_native(&self) -> Result<Box<dyn PlayerBackend>, EngineError>;
}
