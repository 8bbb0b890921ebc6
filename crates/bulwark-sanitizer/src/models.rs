//! # Core Types for the Sanitizer
//!
//! Inbound content is untrusted data. The types in this module carry it
//! through the pipeline and describe what the pipeline did to it; none of
//! them carries a "safe to execute" bit, because content is never a command.
//!
//! ## Design Principles
//!
//! 1. **Degrade, don't reject** - malformed input is repaired, stripped or
//!    truncated, and the [`SanitizationFlags`] record what happened.
//! 2. **Detection is not enforcement** - suspicious patterns are reported by
//!    name; the caller decides what to do.
//! 3. **Traceability** - the original bytes are retained next to the cleaned
//!    text for audit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message as it arrives from an external channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable identifier of the sender (user id, webhook source, ...).
    pub sender_id: String,
    /// Channel the message arrived on (e.g. "slack", "email").
    pub channel: String,
    /// Raw bytes; may contain invalid UTF-8.
    pub content: Vec<u8>,
}

impl InboundMessage {
    /// Builds a message from raw bytes.
    pub fn new(
        sender_id: impl Into<String>,
        channel: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            channel: channel.into(),
            content: content.into(),
        }
    }

    /// Builds a message from text.
    pub fn text(sender_id: impl Into<String>, channel: impl Into<String>, text: &str) -> Self {
        Self::new(sender_id, channel, text.as_bytes().to_vec())
    }
}

/// How serious a suspicious-pattern match is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight contributed to the risk score by one match.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 5.0,
            Severity::Medium => 3.0,
            Severity::Low => 1.0,
        }
    }
}

/// Family of a suspicious pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// "Ignore previous instructions" style phrases.
    InstructionOverride,
    /// Attempts to reassign the assistant's role or persona.
    RoleHijack,
    /// Code blocks, tool-call markup, shell invocations.
    ToolInvocation,
    /// Base64/hex blobs or explicit decode requests.
    EncodedPayload,
    /// System prompt extraction or data exfiltration phrasing.
    Exfiltration,
}

/// One suspicious-pattern hit, recorded by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern name (stable identifier).
    pub name: String,
    /// Pattern family.
    pub category: PatternCategory,
    /// Match severity.
    pub severity: Severity,
}

/// What the pipeline observed and changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanitizationFlags {
    /// Content exceeded the byte ceiling and was cut.
    pub size_truncated: bool,
    /// The sender was over its rate limit when this message arrived.
    pub rate_limited: bool,
    /// Invalid byte sequences were replaced.
    pub encoding_fixed: bool,
    /// Control or invisible format characters were removed.
    pub control_chars_stripped: bool,
    /// Number of characters removed by the control-character pass.
    pub stripped_char_count: usize,
    /// Names of every suspicious pattern that matched, in pattern order.
    pub suspicious_patterns: Vec<String>,
    /// Full match details, parallel to `suspicious_patterns`.
    pub matches: Vec<PatternMatch>,
    /// Informational risk score, 0-100. Never used to block.
    pub risk_score: f64,
    /// Size of the raw input in bytes.
    pub original_bytes: usize,
    /// Size of the cleaned output in bytes.
    pub cleaned_bytes: usize,
    /// Wall-clock time spent in the pipeline.
    pub processing_micros: u64,
}

impl SanitizationFlags {
    /// True if any suspicious pattern matched.
    pub fn is_suspicious(&self) -> bool {
        !self.suspicious_patterns.is_empty()
    }

    /// True if the pipeline changed the content in any way.
    pub fn was_modified(&self) -> bool {
        self.size_truncated || self.encoding_fixed || self.control_chars_stripped
    }
}

/// Read-only snapshot produced once per inbound message.
///
/// Fields are private; the snapshot cannot be mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedMessage {
    sender_id: String,
    channel: String,
    original: Vec<u8>,
    cleaned: String,
    flags: SanitizationFlags,
}

impl SanitizedMessage {
    pub(crate) fn new(
        message: InboundMessage,
        cleaned: String,
        flags: SanitizationFlags,
    ) -> Self {
        Self {
            sender_id: message.sender_id,
            channel: message.channel,
            original: message.content,
            cleaned,
            flags,
        }
    }

    /// Sender of the message.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Channel the message arrived on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The raw bytes exactly as received.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Lossy text view of the original, for display in audit tooling.
    pub fn original_lossy(&self) -> String {
        String::from_utf8_lossy(&self.original).into_owned()
    }

    /// The cleaned content. Always valid UTF-8 and within the byte ceiling.
    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    /// What the pipeline observed and changed.
    pub fn flags(&self) -> &SanitizationFlags {
        &self.flags
    }
}

/// Errors raised by the sanitizer.
///
/// A `SanitizeError` returned from `sanitize` means "do not trust this
/// message", never "the message is safe".
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// The pipeline failed internally.
    #[error("sanitization failed: {0}")]
    Internal(String),

    /// A suspicious-pattern definition is not a valid regex.
    #[error("invalid pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A pattern set could not be parsed.
    #[error("invalid pattern set: {0}")]
    PatternSet(#[from] serde_json::Error),

    /// Configuration is out of range.
    #[error("invalid sanitizer configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_weights_are_ordered() {
        assert!(Severity::Critical.weight() > Severity::High.weight());
        assert!(Severity::High.weight() > Severity::Medium.weight());
        assert!(Severity::Medium.weight() > Severity::Low.weight());
    }

    #[test]
    fn test_flags_helpers() {
        let mut flags = SanitizationFlags::default();
        assert!(!flags.is_suspicious());
        assert!(!flags.was_modified());

        flags.encoding_fixed = true;
        flags.suspicious_patterns.push("role_hijack".to_string());
        assert!(flags.is_suspicious());
        assert!(flags.was_modified());
    }

    #[test]
    fn test_snapshot_keeps_original_bytes() {
        let raw = vec![b'h', b'i', 0xFF];
        let message = InboundMessage::new("u1", "chat", raw.clone());
        let snapshot = SanitizedMessage::new(message, "hi".to_string(), SanitizationFlags::default());

        assert_eq!(snapshot.original(), raw.as_slice());
        assert_eq!(snapshot.cleaned(), "hi");
        assert_eq!(snapshot.original_lossy(), "hi\u{FFFD}");
    }
}
