//! Classification of tool, transport and model failures into plain-language
//! messages.
//!
//! A [`FailureRecord`] keeps the raw detail only long enough to recognise it
//! and scrub it from replies. Its `Debug` output omits the detail so it cannot
//! end up in logs by accident.

use crate::mcp::transport::TransportError;
use std::fmt;

/// Raw fragments shorter than this are too generic to scrub on their own.
const MIN_SCRUB_FRAGMENT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    Transport,
    Tool,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The repository or listing exists but has nothing in it.
    EmptyResource,
    NotFound,
    PermissionDenied,
    InvalidArguments,
    /// A write was requested.
    ReadOnlyRefusal,
    Timeout,
    ToolServerUnavailable,
    ModelUnavailable,
    TurnLimit,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::EmptyResource => "empty_resource",
            FailureKind::NotFound => "not_found",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::ReadOnlyRefusal => "read_only_refusal",
            FailureKind::Timeout => "timeout",
            FailureKind::ToolServerUnavailable => "tool_server_unavailable",
            FailureKind::ModelUnavailable => "model_unavailable",
            FailureKind::TurnLimit => "turn_limit",
            FailureKind::Unknown => "unknown",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::EmptyResource => {
                "That repository currently has no commits or content to list."
            }
            FailureKind::NotFound => {
                "I couldn't find that repository, branch, or path. Please check the repository name, the branch, and that your account has permission to see it."
            }
            FailureKind::PermissionDenied => {
                "Access to that resource was denied. Please check that your access token has permission to read it."
            }
            FailureKind::InvalidArguments => {
                "I couldn't form a valid request for that. Try rephrasing with the exact owner, repository, or branch name."
            }
            FailureKind::ReadOnlyRefusal => crate::core::policy::READ_ONLY_REFUSAL,
            FailureKind::Timeout => {
                "The GitHub tool server took too long to respond. Please try again in a moment."
            }
            FailureKind::ToolServerUnavailable => {
                "The GitHub tool server is not available right now. Please restart the session and try again."
            }
            FailureKind::ModelUnavailable => {
                "I couldn't reach the language model to answer that. Please try again in a moment."
            }
            FailureKind::TurnLimit => {
                "That question needed more lookups than I can make in one turn. Try asking something narrower."
            }
            FailureKind::Unknown => {
                "Something went wrong while looking that up. Please try again or rephrase the question."
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure observed during a turn.
#[derive(Clone, PartialEq)]
pub struct FailureRecord {
    pub origin: FailureOrigin,
    pub kind: FailureKind,
    pub user_message: String,
    raw_detail: String,
}

impl FailureRecord {
    /// Classifies `raw_detail` by origin and content.
    pub fn new(origin: FailureOrigin, raw_detail: impl Into<String>) -> Self {
        let raw_detail = raw_detail.into();
        let kind = classify(origin, &raw_detail);
        Self::with_kind(origin, kind, raw_detail)
    }

    pub fn with_kind(origin: FailureOrigin, kind: FailureKind, raw_detail: impl Into<String>) -> Self {
        Self {
            origin,
            kind,
            user_message: kind.user_message().to_string(),
            raw_detail: raw_detail.into(),
        }
    }

    pub fn from_transport(err: &TransportError) -> Self {
        let kind = match err {
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Closed | TransportError::ChannelClosed | TransportError::Io(_) => {
                FailureKind::ToolServerUnavailable
            }
            TransportError::Rpc { .. } | TransportError::Protocol(_) => {
                classify(FailureOrigin::Transport, &err.to_string())
            }
        };
        Self::with_kind(FailureOrigin::Transport, kind, err.to_string())
    }

    pub fn raw_detail(&self) -> &str {
        &self.raw_detail
    }
}

impl fmt::Debug for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRecord")
            .field("origin", &self.origin)
            .field("kind", &self.kind)
            .field("raw_detail_len", &self.raw_detail.len())
            .finish()
    }
}

/// Maps a raw failure to a kind by case-insensitive signal matching.
pub fn classify(origin: FailureOrigin, raw_detail: &str) -> FailureKind {
    let lower = raw_detail.to_ascii_lowercase();
    let has = |signals: &[&str]| signals.iter().any(|signal| lower.contains(signal));

    if has(&[
        "repository is empty",
        "git repository is empty",
        "no commits",
        "empty repository",
    ]) {
        return FailureKind::EmptyResource;
    }
    if has(&[
        "timed out",
        "timeout",
        "deadline exceeded",
    ]) {
        return FailureKind::Timeout;
    }
    if has(&[
        "bad credentials",
        "forbidden",
        "permission denied",
        "access denied",
        "resource not accessible",
        "requires authentication",
        "unauthorized",
        " 401",
        " 403",
    ]) {
        return FailureKind::PermissionDenied;
    }
    if has(&[
        "not found",
        "no such",
        "does not exist",
        "no commit found",
        " 404",
    ]) {
        return FailureKind::NotFound;
    }
    if has(&[
        "invalid argument",
        "invalid params",
        "invalid input",
        "validation failed",
        "is required",
        "unprocessable",
        " 422",
        "-32602",
    ]) {
        return FailureKind::InvalidArguments;
    }

    match origin {
        FailureOrigin::Model => FailureKind::ModelUnavailable,
        FailureOrigin::Transport | FailureOrigin::Tool => FailureKind::Unknown,
    }
}

/// Replaces any raw failure detail quoted in `text` with that failure's
/// plain-language message. Returns the cleaned text and whether anything
/// was replaced.
pub fn sanitize(text: &str, failures: &[FailureRecord]) -> (String, bool) {
    let mut cleaned = text.to_string();
    let mut replaced = false;

    for failure in failures {
        for fragment in scrub_fragments(failure.raw_detail()) {
            if cleaned.contains(fragment) {
                cleaned = cleaned.replace(fragment, &failure.user_message);
                replaced = true;
            }
        }
    }

    if replaced {
        cleaned = collapse_repeats(&cleaned, failures);
    }
    (cleaned, replaced)
}

/// The whole detail first, then each substantial line, longest first so a
/// line is never cut in half by a shorter overlapping fragment.
fn scrub_fragments(raw_detail: &str) -> Vec<&str> {
    let whole = raw_detail.trim();
    if whole.len() < MIN_SCRUB_FRAGMENT {
        return Vec::new();
    }
    let mut fragments = vec![whole];
    let mut lines: Vec<&str> = whole
        .lines()
        .map(str::trim)
        .filter(|line| line.len() >= MIN_SCRUB_FRAGMENT && *line != whole)
        .collect();
    lines.sort_by_key(|line| std::cmp::Reverse(line.len()));
    lines.dedup();
    fragments.extend(lines);
    fragments
}

fn collapse_repeats(text: &str, failures: &[FailureRecord]) -> String {
    let mut collapsed = text.to_string();
    for failure in failures {
        let doubled = format!("{0}\n{0}", failure.user_message);
        while collapsed.contains(&doubled) {
            collapsed = collapsed.replace(&doubled, &failure.user_message);
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_repository_is_recognised() {
        assert_eq!(
            classify(FailureOrigin::Tool, "Git Repository is empty."),
            FailureKind::EmptyResource
        );
        assert_eq!(
            classify(
                FailureOrigin::Transport,
                "MCP error -32603: GitHub API error (409): Git Repository is empty."
            ),
            FailureKind::EmptyResource
        );
    }

    #[test]
    fn missing_resources_and_permissions_are_separated() {
        assert_eq!(
            classify(FailureOrigin::Tool, "Not Found: Resource not found"),
            FailureKind::NotFound
        );
        assert_eq!(
            classify(FailureOrigin::Tool, "GitHub API error: Bad credentials"),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            classify(
                FailureOrigin::Tool,
                "Resource not accessible by personal access token"
            ),
            FailureKind::PermissionDenied
        );
    }

    #[test]
    fn unmatched_detail_falls_back_by_origin() {
        assert_eq!(
            classify(FailureOrigin::Model, "connection reset by peer"),
            FailureKind::ModelUnavailable
        );
        assert_eq!(
            classify(FailureOrigin::Tool, "unexpected token < in JSON"),
            FailureKind::Unknown
        );
    }

    #[test]
    fn transport_errors_map_structurally() {
        let timeout = FailureRecord::from_transport(&TransportError::Timeout(Duration::from_secs(60)));
        assert_eq!(timeout.kind, FailureKind::Timeout);

        let closed = FailureRecord::from_transport(&TransportError::Closed);
        assert_eq!(closed.kind, FailureKind::ToolServerUnavailable);

        let rpc = FailureRecord::from_transport(&TransportError::Rpc {
            code: -32603,
            message: "Internal error".to_string(),
            details: Some("Not Found: repos/acme/missing".to_string()),
        });
        assert_eq!(rpc.kind, FailureKind::NotFound);
        assert!(rpc.user_message.contains("check the repository name"));
    }

    #[test]
    fn debug_output_hides_raw_detail() {
        let record = FailureRecord::new(FailureOrigin::Tool, "token ghp_abcdef1234567890 rejected");
        let debug = format!("{record:?}");
        assert!(!debug.contains("ghp_abcdef1234567890"));
    }

    #[test]
    fn sanitize_replaces_quoted_detail_and_lines() {
        let raw = "Error: GitHub API error (404): Not Found\n    at fetchRepo (/srv/github/index.js:120:11)";
        let record = FailureRecord::new(FailureOrigin::Tool, raw);
        let reply = "The server said: at fetchRepo (/srv/github/index.js:120:11) so I stopped.";

        let (cleaned, replaced) = sanitize(reply, &[record.clone()]);

        assert!(replaced);
        assert!(!cleaned.contains("index.js"));
        assert!(cleaned.contains(&record.user_message));
    }

    #[test]
    fn sanitize_leaves_unrelated_text_alone() {
        let record = FailureRecord::new(FailureOrigin::Tool, "Git Repository is empty.");
        let (cleaned, replaced) = sanitize("acme/widgets has 3 branches.", &[record]);
        assert!(!replaced);
        assert_eq!(cleaned, "acme/widgets has 3 branches.");
    }
}
