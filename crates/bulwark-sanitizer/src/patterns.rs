//! Suspicious-pattern catalog.
//!
//! Patterns are detection signatures, not filters. A match adds the pattern's
//! name to the message flags and contributes to the informational risk score;
//! the content itself is left as it is.
//!
//! ## Built-in Signatures
//!
//! | Category | Examples |
//! |----------|----------|
//! | Instruction override | "ignore previous instructions", "disregard your rules" |
//! | Role hijack | "you are now in developer mode", "pretend you are not an AI" |
//! | Tool invocation | fenced code blocks, `<tool_call>` markup, shell pipes |
//! | Encoded payload | long base64 runs, "base64 decode" requests |
//! | Exfiltration | "reveal your system prompt", "send this data to" |

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{PatternCategory, PatternMatch, SanitizeError, Severity};
use crate::Result;

/// Serializable pattern definition, as found in a JSON pattern file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDef {
    pub name: String,
    pub pattern: String,
    pub category: PatternCategory,
    pub severity: Severity,
}

impl PatternDef {
    fn new(name: &str, pattern: &str, category: PatternCategory, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category,
            severity,
        }
    }
}

/// The built-in signature set.
pub fn builtin_defs() -> Vec<PatternDef> {
    use PatternCategory::*;
    use Severity::*;

    vec![
        PatternDef::new(
            "ignore_previous_instructions",
            r"(?i)ignore\s+(all\s+)?(the\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?)",
            InstructionOverride,
            Critical,
        ),
        PatternDef::new(
            "disregard_instructions",
            r"(?i)disregard\s+(all\s+)?(your\s+|the\s+)?(previous|prior|above)?\s*(instructions?|prompts?|rules?|guidelines?)",
            InstructionOverride,
            Critical,
        ),
        PatternDef::new(
            "forget_everything",
            r"(?i)forget\s+(everything|all|what)\s+(you|i)?\s*(know|said|told|learned|were told)",
            InstructionOverride,
            High,
        ),
        PatternDef::new(
            "new_instructions",
            r"(?i)(new|updated|real)\s+instructions?\s*:",
            InstructionOverride,
            High,
        ),
        PatternDef::new(
            "role_mode_switch",
            r"(?i)you\s+are\s+now\s+(a|an|in)\s+\w+(\s+mode)?",
            RoleHijack,
            High,
        ),
        PatternDef::new(
            "role_pretend_not_ai",
            r"(?i)(pretend|act|imagine|roleplay)\s+(you('?re| are)|as if you('?re| are))\s+(not\s+)?(an?\s+)?ai",
            RoleHijack,
            High,
        ),
        PatternDef::new(
            "jailbreak_persona",
            r"(?i)\b(DAN|do\s+anything\s+now|jailbreak|developer\s+mode)\b",
            RoleHijack,
            Critical,
        ),
        PatternDef::new(
            "system_role_marker",
            r"(?im)^\s*(system|assistant)\s*:",
            RoleHijack,
            Medium,
        ),
        PatternDef::new(
            "code_block",
            r"```",
            ToolInvocation,
            Low,
        ),
        PatternDef::new(
            "tool_call_markup",
            r"(?i)</?\s*(tool_call|function_call|tool_use|invoke)\b",
            ToolInvocation,
            High,
        ),
        PatternDef::new(
            "shell_invocation",
            r"(?i)(\brm\s+-rf\b|\bcurl\s+[^|\n]*\|\s*(ba)?sh\b|\bwget\s+[^|\n]*\|\s*(ba)?sh\b|\$\([^)]*\))",
            ToolInvocation,
            High,
        ),
        PatternDef::new(
            "encoding_request",
            r"(?i)(base64|rot13|hex)\s*[- ]?(encode|decode|convert)",
            EncodedPayload,
            Medium,
        ),
        PatternDef::new(
            "base64_blob",
            r"[A-Za-z0-9+/]{80,}={0,2}",
            EncodedPayload,
            Medium,
        ),
        PatternDef::new(
            "system_prompt_extraction",
            r"(?i)(show|reveal|display|print|output|repeat)\s+(me\s+)?(your|the)\s+(system\s+)?prompt",
            Exfiltration,
            High,
        ),
        PatternDef::new(
            "data_exfiltration",
            r"(?i)(send|post|upload|transmit|exfil)\s+(this\s+|the\s+|all\s+)?(data|info|information|contents?)\s+to",
            Exfiltration,
            High,
        ),
    ]
}

/// A compiled signature.
#[derive(Debug, Clone)]
struct CompiledPattern {
    def: PatternDef,
    regex: Regex,
}

/// An ordered, compiled set of suspicious patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compiles the built-in signatures.
    pub fn builtin() -> Result<Self> {
        Self::compile(builtin_defs())
    }

    /// Compiles a list of definitions, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError::InvalidPattern`] naming the first definition
    /// whose regex does not compile.
    pub fn compile(defs: Vec<PatternDef>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(defs.len());
        for def in defs {
            let regex = Regex::new(&def.pattern).map_err(|source| SanitizeError::InvalidPattern {
                name: def.name.clone(),
                source,
            })?;
            patterns.push(CompiledPattern { def, regex });
        }
        Ok(Self { patterns })
    }

    /// Parses and compiles a JSON array of [`PatternDef`].
    pub fn from_json(json: &str) -> Result<Self> {
        let defs: Vec<PatternDef> = serde_json::from_str(json)?;
        Self::compile(defs)
    }

    /// Appends more definitions to this set.
    pub fn extend(mut self, defs: Vec<PatternDef>) -> Result<Self> {
        let extra = Self::compile(defs)?;
        self.patterns.extend(extra.patterns);
        Ok(self)
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when the set has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Names of every pattern, in order.
    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.def.name.as_str()).collect()
    }

    /// Returns every pattern that matches `text`, once per pattern.
    pub fn scan(&self, text: &str) -> Vec<PatternMatch> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| PatternMatch {
                name: p.def.name.clone(),
                category: p.def.category,
                severity: p.def.severity,
            })
            .collect()
    }
}

/// Sums severity weights, scales by `trust_multiplier` and caps at 100.
pub fn risk_score(matches: &[PatternMatch], trust_multiplier: f64) -> f64 {
    let raw: f64 = matches.iter().map(|m| m.severity.weight()).sum();
    (raw * trust_multiplier).clamp(0.0, 100.0)
}
