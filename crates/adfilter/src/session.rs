// Session controller: one playback attempt per source URL. Selects a
// backend, wires the rewriter or resolver into it, and owns the backend's
// lifecycle end to end. At most one live session per controller; starting a
// new one tears the previous one down first.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{
    BackendEvent, BackendFactory, FilteringLoader, ManifestLoader, PlayerBackend, RenderTarget,
    VariantInfo,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fetch::ManifestFetcher;
use crate::recovery::{FatalKind, RecoveryAction, RecoveryPolicy};
use crate::registry::ArtifactRegistry;
use crate::resolver::ManifestResolver;
use crate::rewriter::ManifestRewriter;

/// Lifecycle of one playback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Selecting,
    Active,
    Terminated,
}

/// Which backend a session ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    /// Software engine with the interception hook installed.
    Intercepting,
    /// Native decoder fed a pre-resolved manifest tree.
    ResolverNative,
    /// Native decoder pointed directly at the source URL.
    PassthroughNative,
}

/// User-facing signals. Categories are stable; wording is the caller's
/// concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FatalError { kind: FatalKind, message: String },
    AutoplayBlocked { cause: String },
    CompatibilityWarning { message: String },
}

/// Codec families commonly undecodable on target hardware.
const UNSUPPORTED_CODEC_PREFIXES: &[&str] = &["hvc1", "hev1", "av01"];

struct ActiveSession {
    token: CancellationToken,
    driver: JoinHandle<()>,
    registry: Arc<ArtifactRegistry>,
    choice: BackendChoice,
}

pub struct SessionController {
    factory: Arc<dyn BackendFactory>,
    fetcher: Arc<dyn ManifestFetcher>,
    config: EngineConfig,
    events_tx: mpsc::Sender<SessionEvent>,
    current: Option<ActiveSession>,
    /// Shared with the driver task so termination is observable.
    state: Arc<Mutex<SessionState>>,
}

impl SessionController {
    /// Returns the controller and the receiver of its produced signals.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        fetcher: Arc<dyn ManifestFetcher>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        (
            Self {
                factory,
                fetcher,
                config,
                events_tx,
                current: None,
                state: Arc::new(Mutex::new(SessionState::Idle)),
            },
            events_rx,
        )
    }

    /// Start playback of `source_url`, tearing down any prior session first.
    pub async fn start(
        &mut self,
        source_url: &str,
        target: &RenderTarget,
    ) -> Result<BackendChoice, EngineError> {
        self.stop().await;

        self.state = Arc::new(Mutex::new(SessionState::Selecting));
        let registry = Arc::new(ArtifactRegistry::new());
        let (choice, mut backend) = match self.select_backend(source_url, &registry).await {
            Ok(selected) => selected,
            Err(e) => {
                registry.release_all();
                *self.state.lock() = SessionState::Terminated;
                if matches!(e, EngineError::CapabilityUnsupported { .. }) {
                    let _ = self
                        .events_tx
                        .send(SessionEvent::FatalError {
                            kind: FatalKind::Capability,
                            message: e.to_string(),
                        })
                        .await;
                }
                return Err(e);
            }
        };

        backend.attach(target);
        info!(source = source_url, backend = ?choice, "session active");

        *self.state.lock() = SessionState::Active;
        let token = CancellationToken::new();
        let driver = tokio::spawn(drive_session(
            backend,
            choice,
            Arc::clone(&registry),
            token.clone(),
            self.events_tx.clone(),
            Arc::clone(&self.state),
        ));
        self.current = Some(ActiveSession {
            token,
            driver,
            registry,
            choice,
        });
        Ok(choice)
    }

    /// Evaluate the backend selection order once.
    async fn select_backend(
        &self,
        source_url: &str,
        registry: &Arc<ArtifactRegistry>,
    ) -> Result<(BackendChoice, Box<dyn PlayerBackend>), EngineError> {
        let caps = self.factory.capabilities();
        let filtering = self.config.filter.enabled;
        let rewriter = ManifestRewriter::new(self.config.filter.effective_keywords());
        debug!(?caps, filtering, "selecting backend");

        if caps.intercepting && (!caps.native || filtering) {
            let base = self.factory.base_loader();
            let loader: Arc<dyn ManifestLoader> = if filtering {
                Arc::new(FilteringLoader::new(base, rewriter))
            } else {
                base
            };
            let mut backend = self
                .factory
                .create_intercepting(&self.config.tuning, loader)?;
            if let Err(e) = backend.load_source(source_url).await {
                backend.destroy().await;
                return Err(e);
            }
            return Ok((BackendChoice::Intercepting, backend));
        }

        if caps.native && filtering {
            let resolver = ManifestResolver::new(
                Arc::clone(&self.fetcher),
                rewriter,
                Arc::clone(registry),
            );
            let mut backend = self.factory.create_native()?;
            // Degrade to unfiltered playback rather than blocking it.
            let url = match resolver.resolve(source_url).await {
                Ok(resolved) => resolved.entry_point.uri,
                Err(e) => {
                    warn!(error = %e, "tree resolution failed, playing unfiltered source");
                    source_url.to_string()
                }
            };
            if let Err(e) = backend.load_source(&url).await {
                backend.destroy().await;
                return Err(e);
            }
            return Ok((BackendChoice::ResolverNative, backend));
        }

        if caps.native {
            let mut backend = self.factory.create_native()?;
            if let Err(e) = backend.load_source(source_url).await {
                backend.destroy().await;
                return Err(e);
            }
            return Ok((BackendChoice::PassthroughNative, backend));
        }

        Err(EngineError::capability_unsupported(
            "neither an intercepting engine nor native HLS decoding is available",
        ))
    }

    /// Tear down the active session: cancel its driver and wait for the
    /// backend destroy and artifact release to complete. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(session) = self.current.take() {
            debug!(backend = ?session.choice, "tearing down session");
            session.token.cancel();
            if let Err(e) = session.driver.await {
                error!(error = %e, "session driver panicked");
                // The driver could not run its exit path; release here.
                session.registry.release_all();
            }
            *self.state.lock() = SessionState::Terminated;
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn backend_choice(&self) -> Option<BackendChoice> {
        self.current.as_ref().map(|s| s.choice)
    }
}

/// Drives one session: consumes the backend event feed under the recovery
/// policy until cancellation or a fatal failure, then runs the single
/// teardown path (backend destroy + artifact release) exactly once.
async fn drive_session(
    mut backend: Box<dyn PlayerBackend>,
    choice: BackendChoice,
    registry: Arc<ArtifactRegistry>,
    token: CancellationToken,
    events_tx: mpsc::Sender<SessionEvent>,
    state: Arc<Mutex<SessionState>>,
) {
    let mut policy = RecoveryPolicy::new();
    let mut compat_warned = false;

    if let Some(mut feed) = backend.take_events() {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("session cancelled");
                    break;
                }
                ev = feed.recv() => {
                    let Some(ev) = ev else {
                        debug!("backend event feed closed");
                        break;
                    };
                    match ev {
                        BackendEvent::FirstSegmentLoaded => {
                            // Autoplay is armed only on the intercepting
                            // backend; native decoders start themselves.
                            if choice == BackendChoice::Intercepting
                                && let Err(denied) = backend.play().await
                            {
                                info!(cause = %denied.cause, "autoplay blocked");
                                let _ = events_tx
                                    .send(SessionEvent::AutoplayBlocked { cause: denied.cause })
                                    .await;
                            }
                        }
                        BackendEvent::ManifestParsed { variants } => {
                            if !compat_warned
                                && let Some(codec) = first_unsupported_codec(&variants)
                            {
                                compat_warned = true;
                                warn!(codec = %codec, "stream declares a codec common decoders cannot play");
                                let _ = events_tx
                                    .send(SessionEvent::CompatibilityWarning {
                                        message: format!(
                                            "stream declares codec `{codec}` that may not be decodable on this device"
                                        ),
                                    })
                                    .await;
                            }
                        }
                        BackendEvent::Error { category, fatal, detail } => {
                            match policy.on_error(category, fatal, detail.as_deref()) {
                                RecoveryAction::Ignore => {}
                                RecoveryAction::ResumeLoading => backend.start_load().await,
                                RecoveryAction::RecoverMedia => backend.recover_media().await,
                                RecoveryAction::Fatal(report) => {
                                    error!(kind = ?report.kind, detail = %report.detail, "fatal playback failure");
                                    let _ = events_tx
                                        .send(SessionEvent::FatalError {
                                            kind: report.kind,
                                            message: report.detail,
                                        })
                                        .await;
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    // Single exit path: destroy and release exactly once, whatever ended
    // the loop.
    backend.destroy().await;
    registry.release_all();
    *state.lock() = SessionState::Terminated;
    debug!("session terminated");
}

fn first_unsupported_codec(variants: &[VariantInfo]) -> Option<String> {
    variants
        .iter()
        .filter_map(|v| v.codecs.as_deref())
        .flat_map(|codecs| codecs.split(','))
        .map(str::trim)
        .find(|codec| {
            UNSUPPORTED_CODEC_PREFIXES
                .iter()
                .any(|prefix| codec.starts_with(prefix))
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AutoplayDenied, BackendCapabilities, ErrorCategory, LoadContext,
    };
    use crate::config::InterceptingTuning;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use url::Url;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Cmd {
        Load(String),
        Attach,
        StartLoad,
        RecoverMedia,
        Play,
        Destroy,
    }

    struct MockBackend {
        commands: Arc<Mutex<Vec<Cmd>>>,
        events: Option<mpsc::Receiver<BackendEvent>>,
        deny_autoplay: Option<String>,
    }

    #[async_trait]
    impl PlayerBackend for MockBackend {
        async fn load_source(&mut self, url: &str) -> Result<(), EngineError> {
            self.commands.lock().push(Cmd::Load(url.to_string()));
            Ok(())
        }

        fn attach(&mut self, _target: &RenderTarget) {
            self.commands.lock().push(Cmd::Attach);
        }

        async fn start_load(&mut self) {
            self.commands.lock().push(Cmd::StartLoad);
        }

        async fn recover_media(&mut self) {
            self.commands.lock().push(Cmd::RecoverMedia);
        }

        async fn play(&mut self) -> Result<(), AutoplayDenied> {
            self.commands.lock().push(Cmd::Play);
            match &self.deny_autoplay {
                Some(cause) => Err(AutoplayDenied {
                    cause: cause.clone(),
                }),
                None => Ok(()),
            }
        }

        fn take_events(&mut self) -> Option<mpsc::Receiver<BackendEvent>> {
            self.events.take()
        }

        async fn destroy(&mut self) {
            self.commands.lock().push(Cmd::Destroy);
        }
    }

    struct NoopLoader;

    #[async_trait]
    impl ManifestLoader for NoopLoader {
        async fn load(&self, _ctx: &LoadContext) -> Result<String, EngineError> {
            Ok(String::new())
        }
    }

    struct MockFactory {
        caps: BackendCapabilities,
        commands: Arc<Mutex<Vec<Cmd>>>,
        last_tx: Mutex<Option<mpsc::Sender<BackendEvent>>>,
        deny_autoplay: Option<String>,
    }

    impl MockFactory {
        fn new(caps: BackendCapabilities) -> Arc<Self> {
            Arc::new(Self {
                caps,
                commands: Arc::new(Mutex::new(Vec::new())),
                last_tx: Mutex::new(None),
                deny_autoplay: None,
            })
        }

        fn with_autoplay_denied(caps: BackendCapabilities, cause: &str) -> Arc<Self> {
            Arc::new(Self {
                caps,
                commands: Arc::new(Mutex::new(Vec::new())),
                last_tx: Mutex::new(None),
                deny_autoplay: Some(cause.to_string()),
            })
        }

        fn make_backend(&self) -> Box<dyn PlayerBackend> {
            let (tx, rx) = mpsc::channel(32);
            *self.last_tx.lock() = Some(tx);
            Box::new(MockBackend {
                commands: Arc::clone(&self.commands),
                events: Some(rx),
                deny_autoplay: self.deny_autoplay.clone(),
            })
        }

        fn sender(&self) -> mpsc::Sender<BackendEvent> {
            self.last_tx.lock().clone().expect("backend created")
        }

        fn commands(&self) -> Vec<Cmd> {
            self.commands.lock().clone()
        }
    }

    impl BackendFactory for MockFactory {
        fn capabilities(&self) -> BackendCapabilities {
            self.caps
        }

        fn base_loader(&self) -> Arc<dyn ManifestLoader> {
            Arc::new(NoopLoader)
        }

        fn create_intercepting(
            &self,
            _tuning: &InterceptingTuning,
            _loader: Arc<dyn ManifestLoader>,
        ) -> Result<Box<dyn PlayerBackend>, EngineError> {
            Ok(self.make_backend())
        }

        fn create_native(&self) -> Result<Box<dyn PlayerBackend>, EngineError> {
            Ok(self.make_backend())
        }
    }

    struct MapFetcher {
        responses: HashMap<String, String>,
    }

    impl MapFetcher {
        fn empty() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn with(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl ManifestFetcher for MapFetcher {
        async fn fetch_text(&self, url: &Url) -> Result<String, EngineError> {
            self.responses
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| EngineError::fetch_failed(url.as_str(), "no response configured"))
        }
    }

    const SOURCE: &str = "http://cdn.example/live/master.m3u8";

    fn controller(
        factory: Arc<MockFactory>,
        fetcher: MapFetcher,
        filtering: bool,
    ) -> (SessionController, mpsc::Receiver<SessionEvent>) {
        let config = EngineConfig {
            filter: crate::config::FilterConfig {
                enabled: filtering,
                keywords: vec!["/adjump/".to_string()],
            },
            ..EngineConfig::default()
        };
        SessionController::new(factory, Arc::new(fetcher), config)
    }

    fn caps(intercepting: bool, native: bool) -> BackendCapabilities {
        BackendCapabilities {
            intercepting,
            native,
        }
    }

    #[tokio::test]
    async fn intercepting_backend_preferred_when_filtering() {
        let factory = MockFactory::new(caps(true, true));
        let (mut controller, _events) = controller(Arc::clone(&factory), MapFetcher::empty(), true);

        let choice = controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        assert_eq!(choice, BackendChoice::Intercepting);
        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(
            factory.commands(),
            vec![Cmd::Load(SOURCE.to_string()), Cmd::Attach]
        );
        controller.stop().await;
    }

    #[tokio::test]
    async fn intercepting_backend_used_without_filtering_when_native_is_absent() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, _events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), false);

        let choice = controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        assert_eq!(choice, BackendChoice::Intercepting);
        controller.stop().await;
    }

    #[tokio::test]
    async fn passthrough_native_when_filtering_disabled() {
        let factory = MockFactory::new(caps(true, true));
        let (mut controller, _events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), false);

        let choice = controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        assert_eq!(choice, BackendChoice::PassthroughNative);
        assert!(factory.commands().contains(&Cmd::Load(SOURCE.to_string())));
        controller.stop().await;
    }

    #[tokio::test]
    async fn resolver_native_feeds_materialized_entry_point() {
        let leaf = "#EXTM3U\n#EXTINF:4\nseg.ts\n#EXT-X-ENDLIST\n";
        let factory = MockFactory::new(caps(false, true));
        let (mut controller, _events) = controller(
            Arc::clone(&factory),
            MapFetcher::empty().with(SOURCE, leaf),
            true,
        );

        let choice = controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        assert_eq!(choice, BackendChoice::ResolverNative);

        let loaded = factory
            .commands()
            .iter()
            .find_map(|c| match c {
                Cmd::Load(url) => Some(url.clone()),
                _ => None,
            })
            .unwrap();
        assert!(loaded.starts_with("blob:"), "loaded {loaded}");

        let registry = Arc::clone(&controller.current.as_ref().unwrap().registry);
        assert_eq!(registry.len(), 1);

        controller.stop().await;
        assert!(registry.is_empty());
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn resolver_failure_degrades_to_unfiltered_source() {
        let factory = MockFactory::new(caps(false, true));
        let (mut controller, _events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);

        let choice = controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        assert_eq!(choice, BackendChoice::ResolverNative);
        assert!(factory.commands().contains(&Cmd::Load(SOURCE.to_string())));
        controller.stop().await;
    }

    #[tokio::test]
    async fn unsupported_environment_reports_capability_failure() {
        let factory = MockFactory::new(caps(false, false));
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);

        let result = controller.start(SOURCE, &RenderTarget::default()).await;
        assert!(matches!(
            result,
            Err(EngineError::CapabilityUnsupported { .. })
        ));
        assert_eq!(controller.state(), SessionState::Terminated);
        match events.recv().await.unwrap() {
            SessionEvent::FatalError { kind, .. } => assert_eq!(kind, FatalKind::Capability),
            other => panic!("expected fatal error, got {other:?}"),
        }
        assert!(factory.commands().is_empty());
    }

    #[tokio::test]
    async fn four_network_fatals_yield_three_resumes_then_termination() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        let tx = factory.sender();
        for _ in 0..4 {
            tx.send(BackendEvent::Error {
                category: ErrorCategory::Network,
                fatal: true,
                detail: Some("manifest load timeout".to_string()),
            })
            .await
            .unwrap();
        }

        match events.recv().await.unwrap() {
            SessionEvent::FatalError { kind, message } => {
                assert_eq!(kind, FatalKind::Network);
                assert_eq!(message, "manifest load timeout");
            }
            other => panic!("expected fatal error, got {other:?}"),
        }

        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Terminated);
        let resumes = factory
            .commands()
            .iter()
            .filter(|c| **c == Cmd::StartLoad)
            .count();
        assert_eq!(resumes, 3);
        assert_eq!(factory.commands().last(), Some(&Cmd::Destroy));
    }

    #[tokio::test]
    async fn media_fatals_trigger_recover_media() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        let tx = factory.sender();
        for _ in 0..4 {
            tx.send(BackendEvent::Error {
                category: ErrorCategory::Media,
                fatal: true,
                detail: None,
            })
            .await
            .unwrap();
        }

        match events.recv().await.unwrap() {
            SessionEvent::FatalError { kind, .. } => assert_eq!(kind, FatalKind::Media),
            other => panic!("expected fatal error, got {other:?}"),
        }
        controller.stop().await;
        let recoveries = factory
            .commands()
            .iter()
            .filter(|c| **c == Cmd::RecoverMedia)
            .count();
        assert_eq!(recoveries, 3);
    }

    #[tokio::test]
    async fn non_fatal_events_do_not_consume_retries() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        let tx = factory.sender();
        for _ in 0..10 {
            tx.send(BackendEvent::Error {
                category: ErrorCategory::Network,
                fatal: false,
                detail: None,
            })
            .await
            .unwrap();
        }
        tx.send(BackendEvent::Error {
            category: ErrorCategory::Other,
            fatal: true,
            detail: None,
        })
        .await
        .unwrap();

        // The only reaction to the whole feed is the terminal Other fatal.
        match events.recv().await.unwrap() {
            SessionEvent::FatalError { kind, message } => {
                assert_eq!(kind, FatalKind::Other);
                assert_eq!(message, "unknown");
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
        controller.stop().await;
        assert!(!factory.commands().contains(&Cmd::StartLoad));
    }

    #[tokio::test]
    async fn autoplay_denial_is_reported_not_fatal() {
        let factory = MockFactory::with_autoplay_denied(caps(true, false), "user gesture required");
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        factory
            .sender()
            .send(BackendEvent::FirstSegmentLoaded)
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::AutoplayBlocked { cause } => {
                assert_eq!(cause, "user gesture required");
            }
            other => panic!("expected autoplay blocked, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Active);
        assert!(factory.commands().contains(&Cmd::Play));
        controller.stop().await;
    }

    #[tokio::test]
    async fn autoplay_is_not_armed_on_native_backends() {
        let leaf = "#EXTM3U\n#EXTINF:4\nseg.ts\n#EXT-X-ENDLIST\n";
        let factory = MockFactory::new(caps(false, true));
        let (mut controller, mut events) = controller(
            Arc::clone(&factory),
            MapFetcher::empty().with(SOURCE, leaf),
            true,
        );
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        let tx = factory.sender();
        tx.send(BackendEvent::FirstSegmentLoaded).await.unwrap();
        // Sync point: the warning proves the first event was processed.
        tx.send(BackendEvent::ManifestParsed {
            variants: vec![VariantInfo {
                codecs: Some("hvc1.1.6.L93.B0".to_string()),
                bandwidth: Some(1_000_000),
            }],
        })
        .await
        .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::CompatibilityWarning { .. }
        ));
        assert!(!factory.commands().contains(&Cmd::Play));
        controller.stop().await;
    }

    #[tokio::test]
    async fn codec_warning_is_emitted_once_and_names_the_codec() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, mut events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        let variants = vec![
            VariantInfo {
                codecs: Some("avc1.64001f,mp4a.40.2".to_string()),
                bandwidth: Some(2_000_000),
            },
            VariantInfo {
                codecs: Some("hev1.1.6.L120.90".to_string()),
                bandwidth: Some(4_000_000),
            },
        ];
        let tx = factory.sender();
        tx.send(BackendEvent::ManifestParsed {
            variants: variants.clone(),
        })
        .await
        .unwrap();
        tx.send(BackendEvent::ManifestParsed { variants }).await.unwrap();
        tx.send(BackendEvent::Error {
            category: ErrorCategory::Other,
            fatal: true,
            detail: Some("done".to_string()),
        })
        .await
        .unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::CompatibilityWarning { message } => {
                assert!(message.contains("hev1.1.6.L120.90"));
            }
            other => panic!("expected compatibility warning, got {other:?}"),
        }
        // Second parse produced no second warning; next signal is the fatal.
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::FatalError { .. }
        ));
        controller.stop().await;
    }

    #[test]
    fn supported_codecs_produce_no_warning() {
        let variants = vec![VariantInfo {
            codecs: Some("avc1.64001f,mp4a.40.2".to_string()),
            bandwidth: None,
        }];
        assert_eq!(first_unsupported_codec(&variants), None);
    }

    #[tokio::test]
    async fn new_session_supersedes_the_previous_one() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, _events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);

        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();
        controller
            .start("http://cdn.example/live/other.m3u8", &RenderTarget::default())
            .await
            .unwrap();

        let commands = factory.commands();
        // The first backend was destroyed before the second loaded.
        let destroy_pos = commands.iter().position(|c| *c == Cmd::Destroy).unwrap();
        let second_load_pos = commands
            .iter()
            .position(|c| *c == Cmd::Load("http://cdn.example/live/other.m3u8".to_string()))
            .unwrap();
        assert!(destroy_pos < second_load_pos);
        assert_eq!(controller.state(), SessionState::Active);
        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let factory = MockFactory::new(caps(true, false));
        let (mut controller, _events) =
            controller(Arc::clone(&factory), MapFetcher::empty(), true);
        controller.start(SOURCE, &RenderTarget::default()).await.unwrap();

        controller.stop().await;
        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Terminated);
        let destroys = factory
            .commands()
            .iter()
            .filter(|c| **c == Cmd::Destroy)
            .count();
        assert_eq!(destroys, 1);
    }
}
