// Manifest resolver: pre-fetches and rewrites an entire manifest tree for
// backends that cannot intercept network requests. The rewritten master
// references locally materialized children instead of their network URLs.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use url::Url;

use crate::error::EngineError;
use crate::fetch::ManifestFetcher;
use crate::registry::{Artifact, ArtifactRegistry};
use crate::rewriter::ManifestRewriter;

const TAG_STREAM_INF: &str = "#EXT-X-STREAM-INF";
const TAG_MEDIA: &str = "#EXT-X-MEDIA:";
const URI_ATTR: &str = "URI=\"";

/// Where a child reference sits inside the master text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildSlot {
    /// Bare playlist-reference line immediately after `#EXT-X-STREAM-INF`.
    VariantLine,
    /// Quoted URI attribute of an `#EXT-X-MEDIA` tag.
    RenditionAttr,
}

#[derive(Debug, Clone)]
struct ChildRef {
    line_idx: usize,
    uri: String,
    slot: ChildSlot,
}

/// Outcome of one tree resolution.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    /// The artifact the backend should be pointed at.
    pub entry_point: Artifact,
    /// Every artifact minted for this tree, entry point included.
    pub artifacts: Vec<Artifact>,
}

pub struct ManifestResolver {
    fetcher: Arc<dyn ManifestFetcher>,
    rewriter: ManifestRewriter,
    registry: Arc<ArtifactRegistry>,
}

impl ManifestResolver {
    pub fn new(
        fetcher: Arc<dyn ManifestFetcher>,
        rewriter: ManifestRewriter,
        registry: Arc<ArtifactRegistry>,
    ) -> Self {
        Self {
            fetcher,
            rewriter,
            registry,
        }
    }

    /// Resolve `master_url` into a playable in-memory tree.
    ///
    /// A failed child fetch degrades that line to its original absolute URL;
    /// only a failed root fetch propagates, yielding no artifacts.
    pub async fn resolve(&self, master_url: &str) -> Result<ResolvedManifest, EngineError> {
        let root = Url::parse(master_url)
            .map_err(|e| EngineError::invalid_url(master_url, e.to_string()))?;
        let text = self.fetcher.fetch_text(&root).await?;

        if !text.contains(TAG_STREAM_INF) {
            debug!(url = master_url, "leaf playlist, rewriting directly");
            let artifact = self
                .registry
                .register(self.rewriter.rewrite(&text, master_url));
            return Ok(ResolvedManifest {
                entry_point: artifact.clone(),
                artifacts: vec![artifact],
            });
        }

        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        let children = discover_children(&lines);
        debug!(
            url = master_url,
            children = children.len(),
            "resolving master playlist tree"
        );

        // One independent fetch/rewrite/materialize task per child; sibling
        // failures must not abort each other. Substitutions are line-indexed,
        // so completion order is irrelevant.
        let tasks = children.into_iter().map(|child| {
            let fetcher = Arc::clone(&self.fetcher);
            let rewriter = self.rewriter.clone();
            let registry = Arc::clone(&self.registry);
            let root = root.clone();
            async move {
                let absolute = match root.join(&child.uri) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(uri = %child.uri, error = %e, "child URI did not resolve, leaving line untouched");
                        return (child, None);
                    }
                };
                match fetcher.fetch_text(&absolute).await {
                    Ok(body) => {
                        let artifact =
                            registry.register(rewriter.rewrite(&body, absolute.as_str()));
                        (child, Some((artifact.uri.clone(), Some(artifact))))
                    }
                    Err(e) => {
                        warn!(url = %absolute, error = %e, "child fetch failed, falling back to original URL");
                        (child, Some((absolute.to_string(), None)))
                    }
                }
            }
        });

        let mut artifacts = Vec::new();
        for (child, outcome) in join_all(tasks).await {
            let Some((replacement, artifact)) = outcome else {
                continue;
            };
            match child.slot {
                ChildSlot::VariantLine => lines[child.line_idx] = replacement,
                ChildSlot::RenditionAttr => {
                    let old = format!("{}{}\"", URI_ATTR, child.uri);
                    let new = format!("{}{}\"", URI_ATTR, replacement);
                    lines[child.line_idx] = lines[child.line_idx].replacen(&old, &new, 1);
                }
            }
            if let Some(artifact) = artifact {
                artifacts.push(artifact);
            }
        }

        let substituted = lines.join("\n");
        let entry_point = self
            .registry
            .register(self.rewriter.rewrite(&substituted, master_url));
        artifacts.push(entry_point.clone());

        Ok(ResolvedManifest {
            entry_point,
            artifacts,
        })
    }
}

/// Scan the master for child playlist references. Only relative URIs are
/// candidates; absolute children are left for the decoder to fetch itself.
fn discover_children(lines: &[String]) -> Vec<ChildRef> {
    let mut children = Vec::new();
    let mut after_stream_inf = false;
    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();

        if line.starts_with(TAG_MEDIA) {
            if let Some(uri) = quoted_uri(line)
                && is_relative(&uri)
            {
                children.push(ChildRef {
                    line_idx: idx,
                    uri,
                    slot: ChildSlot::RenditionAttr,
                });
            }
            continue;
        }

        if line.starts_with(TAG_STREAM_INF) {
            after_stream_inf = true;
            continue;
        }

        if after_stream_inf && !line.is_empty() {
            if !line.starts_with('#') && is_relative(line) {
                children.push(ChildRef {
                    line_idx: idx,
                    uri: line.to_string(),
                    slot: ChildSlot::VariantLine,
                });
            }
            after_stream_inf = false;
        }
    }
    children
}

fn quoted_uri(line: &str) -> Option<String> {
    let start = line.find(URI_ATTR)? + URI_ATTR.len();
    let len = line[start..].find('"')?;
    Some(line[start..start + len].to_string())
}

fn is_relative(uri: &str) -> bool {
    !uri.starts_with("http") && !uri.starts_with("blob:")
}
