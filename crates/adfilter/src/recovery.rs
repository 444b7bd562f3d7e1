// Failure recovery policy: per-session bounded retry over the backend's
// fault feed before declaring a user-visible failure.

use tracing::warn;

use crate::backend::ErrorCategory;

/// Retry ceiling for each of the network and media fatal classes.
pub const MAX_FATAL_RETRIES: u32 = 3;

/// Stable failure category surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    Network,
    Media,
    /// The environment cannot play HLS at all.
    Capability,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReport {
    pub kind: FatalKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Non-fatal event, nothing to do.
    Ignore,
    /// Issue a resume-loading command to the backend.
    ResumeLoading,
    /// Issue a recover-media command to the backend.
    RecoverMedia,
    /// Give up and terminate the session.
    Fatal(FatalReport),
}

/// Counters are per-session; a new session gets a fresh policy.
#[derive(Debug, Default)]
pub struct RecoveryPolicy {
    network_faults: u32,
    media_faults: u32,
}

impl RecoveryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(
        &mut self,
        category: ErrorCategory,
        fatal: bool,
        detail: Option<&str>,
    ) -> RecoveryAction {
        if !fatal {
            return RecoveryAction::Ignore;
        }
        match category {
            ErrorCategory::Network => {
                self.network_faults += 1;
                if self.network_faults <= MAX_FATAL_RETRIES {
                    warn!(
                        attempt = self.network_faults,
                        max = MAX_FATAL_RETRIES,
                        "fatal network fault, resuming load"
                    );
                    RecoveryAction::ResumeLoading
                } else {
                    RecoveryAction::Fatal(FatalReport {
                        kind: FatalKind::Network,
                        detail: detail.unwrap_or("network failure").to_string(),
                    })
                }
            }
            ErrorCategory::Media => {
                self.media_faults += 1;
                if self.media_faults <= MAX_FATAL_RETRIES {
                    warn!(
                        attempt = self.media_faults,
                        max = MAX_FATAL_RETRIES,
                        "fatal media fault, attempting recovery"
                    );
                    RecoveryAction::RecoverMedia
                } else {
                    RecoveryAction::Fatal(FatalReport {
                        kind: FatalKind::Media,
                        detail: detail.unwrap_or("media failure").to_string(),
                    })
                }
            }
            // No retry for anything else.
            ErrorCategory::Other => RecoveryAction::Fatal(FatalReport {
                kind: FatalKind::Other,
                detail: detail.unwrap_or("unknown").to_string(),
            }),
        }
    }
}
