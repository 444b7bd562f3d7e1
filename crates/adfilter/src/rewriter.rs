// Manifest rewriter: line-level ad excision and URI absolutization for HLS playlists.
//
// Pure text-to-text, no I/O. Malformed input degrades to best-effort output
// instead of failing; callers never see an error from this module.

use tracing::debug;
use url::Url;

/// Fallback ad-match pattern used when the configured keyword list is empty.
pub const DEFAULT_AD_KEYWORD: &str = "/adjump/";

const TAG_EXTINF: &str = "#EXTINF";
const TAG_DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";
const TAG_DISCONTINUITY_SEQUENCE: &str = "#EXT-X-DISCONTINUITY-SEQUENCE";
const URI_ATTR: &str = "URI=\"";

/// Base-URL context derived once per document.
#[derive(Debug, Clone)]
struct RewriteContext {
    /// Directory of the playlist URL, trailing slash included.
    base_path: String,
    /// `scheme://host[:port]` of the playlist URL, no trailing slash.
    origin: String,
}

impl RewriteContext {
    fn derive(base_url: &str) -> Option<Self> {
        let url = Url::parse(base_url).ok()?;
        let base_path = url.join(".").ok()?.to_string();
        let origin = url.origin().ascii_serialization();
        Some(Self { base_path, origin })
    }
}

/// Rewrites playlist text: drops ad segments (and their metadata preamble),
/// applies the hybrid discontinuity policy, and resolves relative URIs
/// against the playlist's own URL.
#[derive(Debug, Clone)]
pub struct ManifestRewriter {
    keywords: Vec<String>,
}

impl ManifestRewriter {
    /// An empty keyword list falls back to [`DEFAULT_AD_KEYWORD`].
    pub fn new(keywords: Vec<String>) -> Self {
        let keywords = if keywords.is_empty() {
            vec![DEFAULT_AD_KEYWORD.to_string()]
        } else {
            keywords
        };
        Self { keywords }
    }

    /// Rewrite `content` relative to `base_url`. Total: never fails.
    ///
    /// When `base_url` does not parse, relative URIs pass through unresolved
    /// while ad excision and the discontinuity policy still apply.
    pub fn rewrite(&self, content: &str, base_url: &str) -> String {
        let ctx = RewriteContext::derive(base_url);
        if ctx.is_none() {
            debug!(base_url, "base URL did not parse, emitting relative URIs unchanged");
        }

        // Hybrid policy pre-scan: with zero ad matches in the whole document,
        // discontinuity tags are formatting artifacts and are dropped; with at
        // least one match they are kept unless adjacent to a removed segment.
        let has_ad_signal = content.lines().any(|l| self.is_ad_line(l.trim()));

        let mut out: Vec<String> = Vec::new();
        for raw in content.split('\n') {
            let line = raw.trim();

            if !line.is_empty() && self.is_ad_line(line) {
                // Pop the removed segment's own metadata preamble, stopping at
                // the first non-metadata line.
                while out.last().is_some_and(|prev| is_metadata(prev.trim())) {
                    out.pop();
                }
                continue;
            }

            if is_discontinuity(line) {
                if has_ad_signal {
                    out.push(raw.to_string());
                }
                continue;
            }

            if line.is_empty() || line.starts_with("http") || line.starts_with("blob:") {
                out.push(raw.to_string());
                continue;
            }

            if line.starts_with('#') {
                let rewritten = self.rewrite_tag_uri(line, ctx.as_ref());
                if rewritten == line {
                    out.push(raw.to_string());
                } else {
                    out.push(rewritten);
                }
                continue;
            }

            out.push(resolve_bare_uri(line, ctx.as_ref()));
        }

        out.join("\n")
    }

    fn is_ad_line(&self, line: &str) -> bool {
        self.keywords.iter().any(|k| line.contains(k.as_str()))
    }

    /// Rewrite a quoted `URI="…"` attribute inside a tag line. Absolute,
    /// root-relative and local-artifact values stay untouched.
    fn rewrite_tag_uri(&self, line: &str, ctx: Option<&RewriteContext>) -> String {
        let Some(ctx) = ctx else {
            return line.to_string();
        };
        let Some(attr_pos) = line.find(URI_ATTR) else {
            return line.to_string();
        };
        let value_start = attr_pos + URI_ATTR.len();
        let Some(value_len) = line[value_start..].find('"') else {
            return line.to_string();
        };
        let value = &line[value_start..value_start + value_len];
        if value.starts_with("http") || value.starts_with('/') || value.starts_with("blob:") {
            return line.to_string();
        }
        format!(
            "{}{}{}",
            &line[..value_start],
            ctx.base_path,
            &line[value_start..]
        )
    }
}

fn is_discontinuity(line: &str) -> bool {
    line.starts_with(TAG_DISCONTINUITY) && !line.starts_with(TAG_DISCONTINUITY_SEQUENCE)
}

fn is_metadata(line: &str) -> bool {
    line.starts_with(TAG_EXTINF) || is_discontinuity(line)
}

fn resolve_bare_uri(line: &str, ctx: Option<&RewriteContext>) -> String {
    let Some(ctx) = ctx else {
        return line.to_string();
    };
    if line.starts_with('/') {
        format!("{}{}", ctx.origin, line)
    } else {
        format!("{}{}", ctx.base_path, line)
    }
}
