//! # Capability Data Model
//!
//! A [`CapabilityDefinition`] is the contract of an invocable tool: its id,
//! display name, parameter schema, timeout, sandbox flag and permission tier.
//! Definitions are immutable once registered.
//!
//! The registry holds no permission logic. `permission_tier` is recorded here
//! so that the policy engine can read it and so that handlers of the wrong
//! category cannot be bound.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timeout applied when a definition does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sandbox flag applied when a definition does not specify one.
pub const DEFAULT_SANDBOXED: bool = true;

/// Permission category of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionTier {
    /// Observes state without changing it.
    Read,
    /// Changes state recoverably.
    Write,
    /// Deletes, spends or otherwise changes state irreversibly.
    Destructive,
}

impl PermissionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionTier::Read => "read",
            PermissionTier::Write => "write",
            PermissionTier::Destructive => "destructive",
        }
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive JSON type a parameter must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    /// True if `value` conforms to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type name of a value, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema entry for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    pub fn required(kind: ParamType) -> Self {
        Self {
            kind,
            required: true,
            description: None,
        }
    }

    pub fn optional(kind: ParamType) -> Self {
        Self {
            kind,
            required: false,
            description: None,
        }
    }
}

/// Contract of an invocable capability.
///
/// # Example
///
/// ```rust
/// use bulwark_registry::{CapabilityDefinition, ParamType, PermissionTier};
///
/// let def = CapabilityDefinition::new("file_read", "Read file", PermissionTier::Read)
///     .with_parameter("path", ParamType::String, true)
///     .with_timeout_ms(5_000);
///
/// assert_eq!(def.timeout().as_secs(), 5);
/// assert!(def.is_sandboxed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandboxed: Option<bool>,
    pub permission_tier: PermissionTier,
}

impl CapabilityDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tier: PermissionTier) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parameters: BTreeMap::new(),
            timeout_ms: None,
            sandboxed: None,
            permission_tier: tier,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, kind: ParamType, required: bool) -> Self {
        self.parameters.insert(
            name.into(),
            ParameterSpec {
                kind,
                required,
                description: None,
            },
        );
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_sandboxed(mut self, sandboxed: bool) -> Self {
        self.sandboxed = Some(sandboxed);
        self
    }

    /// Effective timeout, defaulting to 30 seconds.
    pub fn timeout(&self) -> Duration {
        self.timeout_ms.map_or(DEFAULT_TIMEOUT, Duration::from_millis)
    }

    /// Effective sandbox flag, defaulting to true.
    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed.unwrap_or(DEFAULT_SANDBOXED)
    }

    /// Names of required parameters.
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}

/// How the validator treats parameters absent from the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownParameterPolicy {
    /// Report as a warning; the call stays valid.
    #[default]
    Warn,
    /// Report as an error.
    Reject,
}

/// One problem found while validating parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// Parameters were not a JSON object.
    NotAnObject { actual: String },
    /// A required parameter is absent or null.
    MissingRequired { name: String },
    /// A parameter has the wrong primitive type.
    TypeMismatch {
        name: String,
        expected: ParamType,
        actual: String,
    },
    /// A parameter is not in the schema.
    UnknownParameter { name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NotAnObject { actual } => {
                write!(f, "parameters must be an object, got {}", actual)
            }
            ValidationIssue::MissingRequired { name } => {
                write!(f, "missing required parameter '{}'", name)
            }
            ValidationIssue::TypeMismatch {
                name,
                expected,
                actual,
            } => write!(f, "parameter '{}' must be {}, got {}", name, expected, actual),
            ValidationIssue::UnknownParameter { name } => {
                write!(f, "unknown parameter '{}'", name)
            }
        }
    }
}

/// Result of validating a parameter object against a capability schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when there are no errors. Warnings do not affect validity.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All errors joined into one human-readable line.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Checks `params` against `definition`.
///
/// Every missing required parameter and every type mismatch is reported,
/// not just the first. A null value counts as absent.
pub fn validate_against(
    definition: &CapabilityDefinition,
    params: &Value,
    unknown: UnknownParameterPolicy,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let empty = serde_json::Map::new();
    let object = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            report.errors.push(ValidationIssue::NotAnObject {
                actual: json_type_name(other).to_string(),
            });
            return report;
        }
    };

    for (name, spec) in &definition.parameters {
        match object.get(name) {
            None | Some(Value::Null) => {
                if spec.required {
                    report
                        .errors
                        .push(ValidationIssue::MissingRequired { name: name.clone() });
                }
            }
            Some(value) if !spec.kind.accepts(value) => {
                report.errors.push(ValidationIssue::TypeMismatch {
                    name: name.clone(),
                    expected: spec.kind,
                    actual: json_type_name(value).to_string(),
                });
            }
            Some(_) => {}
        }
    }

    for name in object.keys() {
        if !definition.parameters.contains_key(name) {
            let issue = ValidationIssue::UnknownParameter { name: name.clone() };
            match unknown {
                UnknownParameterPolicy::Warn => report.warnings.push(issue),
                UnknownParameterPolicy::Reject => report.errors.push(issue),
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file_write() -> CapabilityDefinition {
        CapabilityDefinition::new("file_write", "Write file", PermissionTier::Write)
            .with_parameter("path", ParamType::String, true)
            .with_parameter("content", ParamType::String, true)
            .with_parameter("append", ParamType::Boolean, false)
            .with_parameter("mode", ParamType::Integer, false)
    }

    #[test]
    fn test_defaults_when_unspecified() {
        let def = file_write();
        assert_eq!(def.timeout(), DEFAULT_TIMEOUT);
        assert!(def.is_sandboxed());

        let def = def.with_timeout_ms(1_500).with_sandboxed(false);
        assert_eq!(def.timeout(), Duration::from_millis(1_500));
        assert!(!def.is_sandboxed());
    }

    #[test]
    fn test_valid_parameters() {
        let report = validate_against(
            &file_write(),
            &json!({"path": "/tmp/a", "content": "x", "append": true}),
            UnknownParameterPolicy::Warn,
        );
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_reports_every_problem() {
        let report = validate_against(
            &file_write(),
            &json!({"path": 7, "append": "yes", "mode": 1.5}),
            UnknownParameterPolicy::Warn,
        );
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 4);
        assert!(report
            .errors
            .contains(&ValidationIssue::MissingRequired { name: "content".into() }));
        assert!(report.errors.contains(&ValidationIssue::TypeMismatch {
            name: "mode".into(),
            expected: ParamType::Integer,
            actual: "number".into(),
        }));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let report = validate_against(
            &file_write(),
            &json!({"path": null, "content": "x"}),
            UnknownParameterPolicy::Warn,
        );
        assert_eq!(
            report.errors,
            vec![ValidationIssue::MissingRequired { name: "path".into() }]
        );
    }

    #[test]
    fn test_unknown_parameter_policy() {
        let params = json!({"path": "/a", "content": "x", "owner": "root"});

        let warn = validate_against(&file_write(), &params, UnknownParameterPolicy::Warn);
        assert!(warn.is_valid());
        assert_eq!(warn.warnings.len(), 1);

        let reject = validate_against(&file_write(), &params, UnknownParameterPolicy::Reject);
        assert!(!reject.is_valid());
        assert_eq!(reject.error_summary(), "unknown parameter 'owner'");
    }

    #[test]
    fn test_non_object_parameters() {
        let report = validate_against(&file_write(), &json!([1]), UnknownParameterPolicy::Warn);
        assert_eq!(
            report.errors,
            vec![ValidationIssue::NotAnObject { actual: "array".into() }]
        );
    }

    #[test]
    fn test_definition_wire_shape() {
        let json = r#"{
            "id": "http_get",
            "name": "HTTP GET",
            "parameters": {"url": {"type": "string", "required": true}},
            "permission_tier": "read"
        }"#;
        let def: CapabilityDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.parameters["url"].kind, ParamType::String);
        assert_eq!(def.required_parameters().collect::<Vec<_>>(), vec!["url"]);
        assert_eq!(def.timeout(), DEFAULT_TIMEOUT);
    }
}
