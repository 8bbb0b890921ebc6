//! The capability catalog.
//!
//! The registry is an explicit owned store, constructed once and shared by
//! handle. It answers three questions and nothing else:
//!
//! - does capability `id` exist, and what is its contract?
//! - which handler implements it?
//! - do these parameters satisfy the contract?
//!
//! It holds no permission logic; that belongs to the policy engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bulwark_audit::{AuditAction, AuditRecord, AuditSink};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::canonical::fingerprint;
use crate::error::{RegistryError, Result};
use crate::handler::ToolHandler;
use crate::manifest::CapabilityManifest;
use crate::models::{
    validate_against, CapabilityDefinition, PermissionTier, UnknownParameterPolicy,
    ValidationReport,
};

struct Entry {
    definition: Arc<CapabilityDefinition>,
    handler: ToolHandler,
    fingerprint: String,
    registered_at: DateTime<Utc>,
}

/// Catalog listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySummary {
    pub id: String,
    pub name: String,
    pub permission_tier: PermissionTier,
    pub timeout_ms: u64,
    pub sandboxed: bool,
    pub handler_bound: bool,
    pub fingerprint: String,
    pub registered_at: DateTime<Utc>,
}

/// Registry of invocable capabilities.
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    unknown_parameters: UnknownParameterPolicy,
    audit: Arc<dyn AuditSink>,
}

impl ToolRegistry {
    /// Creates an empty registry that warns on unknown parameters.
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            unknown_parameters: UnknownParameterPolicy::default(),
            audit,
        }
    }

    /// Sets how unknown parameters are treated by validation.
    pub fn with_unknown_parameter_policy(mut self, policy: UnknownParameterPolicy) -> Self {
        self.unknown_parameters = policy;
        self
    }

    pub fn unknown_parameter_policy(&self) -> UnknownParameterPolicy {
        self.unknown_parameters
    }

    /// Registers a capability and its handler.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidDefinition`] if the id is empty or the timeout is zero
    /// - [`RegistryError::TierMismatch`] if the handler's tier differs from the definition's
    /// - [`RegistryError::AlreadyRegistered`] if the id is taken
    pub fn register(&self, definition: CapabilityDefinition, handler: ToolHandler) -> Result<()> {
        check_definition(&definition)?;
        check_tier(&definition, &handler)?;

        let entry = new_entry(definition, handler)?;
        let (id, tier, fp, bound) = (
            entry.definition.id.clone(),
            entry.definition.permission_tier,
            entry.fingerprint.clone(),
            !entry.handler.is_placeholder(),
        );

        {
            let mut entries = self.entries.write();
            if entries.contains_key(&id) {
                return Err(RegistryError::AlreadyRegistered(id));
            }
            entries.insert(id.clone(), entry);
        }

        info!(tool_id = %id, tier = %tier, handler_bound = bound, "capability registered");
        self.audit.record(AuditRecord::system(
            AuditAction::ToolRegistered,
            json!({ "tool_id": id, "permission_tier": tier, "fingerprint": fp, "handler_bound": bound }),
        ));
        Ok(())
    }

    /// Removes a capability, returning its definition.
    pub fn unregister(&self, id: &str) -> Result<Arc<CapabilityDefinition>> {
        let entry = self
            .entries
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        info!(tool_id = %id, "capability unregistered");
        self.audit.record(AuditRecord::system(
            AuditAction::ToolUnregistered,
            json!({ "tool_id": id, "fingerprint": entry.fingerprint }),
        ));
        Ok(entry.definition)
    }

    /// Binds a real handler to a capability that has a placeholder.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the capability does not exist
    /// - [`RegistryError::TierMismatch`] if the handler's tier differs
    /// - [`RegistryError::HandlerAlreadyBound`] if a real handler is present
    pub fn register_handler(&self, id: &str, handler: ToolHandler) -> Result<()> {
        let tier = {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            check_tier(&entry.definition, &handler)?;
            if !entry.handler.is_placeholder() {
                return Err(RegistryError::HandlerAlreadyBound(id.to_string()));
            }
            entry.handler = handler;
            entry.definition.permission_tier
        };

        info!(tool_id = %id, tier = %tier, "handler bound");
        self.audit.record(AuditRecord::system(
            AuditAction::ToolHandlerBound,
            json!({ "tool_id": id, "permission_tier": tier }),
        ));
        Ok(())
    }

    /// Registers every manifest entry with a placeholder handler.
    ///
    /// All-or-nothing: if any entry is invalid or its id is taken, nothing is
    /// registered.
    pub fn load_capabilities_from_config(&self, manifest: CapabilityManifest) -> Result<usize> {
        let mut staged = Vec::with_capacity(manifest.len());
        for definition in manifest.capabilities {
            check_definition(&definition)?;
            staged.push(new_entry(definition, ToolHandler::Placeholder)?);
        }

        let summaries: Vec<(String, PermissionTier, String)> = {
            let mut entries = self.entries.write();
            let mut seen = std::collections::HashSet::new();
            for entry in &staged {
                let id = &entry.definition.id;
                if entries.contains_key(id) || !seen.insert(id.clone()) {
                    return Err(RegistryError::AlreadyRegistered(id.clone()));
                }
            }
            staged
                .into_iter()
                .map(|entry| {
                    let summary = (
                        entry.definition.id.clone(),
                        entry.definition.permission_tier,
                        entry.fingerprint.clone(),
                    );
                    entries.insert(entry.definition.id.clone(), entry);
                    summary
                })
                .collect()
        };

        for (id, tier, fp) in &summaries {
            self.audit.record(AuditRecord::system(
                AuditAction::ToolRegistered,
                json!({ "tool_id": id, "permission_tier": tier, "fingerprint": fp, "handler_bound": false }),
            ));
        }
        info!(count = summaries.len(), "capabilities loaded from manifest");
        Ok(summaries.len())
    }

    /// Definition of `id`.
    pub fn get(&self, id: &str) -> Option<Arc<CapabilityDefinition>> {
        self.entries.read().get(id).map(|e| e.definition.clone())
    }

    /// Definition and handler of `id`, read under one lock.
    pub fn resolve(&self, id: &str) -> Option<(Arc<CapabilityDefinition>, ToolHandler)> {
        self.entries
            .read()
            .get(id)
            .map(|e| (e.definition.clone(), e.handler.clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// True when `id` exists and has a real handler.
    pub fn has_handler(&self, id: &str) -> bool {
        self.entries
            .read()
            .get(id)
            .is_some_and(|e| !e.handler.is_placeholder())
    }

    /// SHA-256 fingerprint recorded at registration.
    pub fn fingerprint(&self, id: &str) -> Option<String> {
        self.entries.read().get(id).map(|e| e.fingerprint.clone())
    }

    /// Validates `params` against the schema of `id`.
    pub fn validate_parameters(&self, id: &str, params: &Value) -> Result<ValidationReport> {
        let definition = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let report = validate_against(&definition, params, self.unknown_parameters);
        for warning in &report.warnings {
            warn!(tool_id = %id, "{}", warning);
        }
        if !report.is_valid() {
            debug!(tool_id = %id, errors = %report.error_summary(), "parameter validation failed");
        }
        Ok(report)
    }

    /// Effective timeout of `id`.
    pub fn get_timeout(&self, id: &str) -> Result<Duration> {
        self.get(id)
            .map(|d| d.timeout())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Effective sandbox flag of `id`.
    pub fn is_sandboxed(&self, id: &str) -> Result<bool> {
        self.get(id)
            .map(|d| d.is_sandboxed())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Catalog listing sorted by id.
    pub fn list(&self) -> Vec<CapabilitySummary> {
        let mut rows: Vec<CapabilitySummary> = self
            .entries
            .read()
            .values()
            .map(|e| CapabilitySummary {
                id: e.definition.id.clone(),
                name: e.definition.name.clone(),
                permission_tier: e.definition.permission_tier,
                timeout_ms: u64::try_from(e.definition.timeout().as_millis()).unwrap_or(u64::MAX),
                sandboxed: e.definition.is_sandboxed(),
                handler_bound: !e.handler.is_placeholder(),
                fingerprint: e.fingerprint.clone(),
                registered_at: e.registered_at,
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("capabilities", &self.len())
            .field("unknown_parameters", &self.unknown_parameters)
            .finish()
    }
}

fn check_definition(definition: &CapabilityDefinition) -> Result<()> {
    let invalid = |reason: &str| RegistryError::InvalidDefinition {
        id: definition.id.clone(),
        reason: reason.to_string(),
    };
    if definition.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if definition.timeout_ms == Some(0) {
        return Err(invalid("timeout_ms must be > 0"));
    }
    Ok(())
}

fn check_tier(definition: &CapabilityDefinition, handler: &ToolHandler) -> Result<()> {
    match handler.tier() {
        Some(tier) if tier != definition.permission_tier => Err(RegistryError::TierMismatch {
            id: definition.id.clone(),
            declared: definition.permission_tier,
            handler: tier,
        }),
        _ => Ok(()),
    }
}

fn new_entry(definition: CapabilityDefinition, handler: ToolHandler) -> Result<Entry> {
    let value = serde_json::to_value(&definition)?;
    Ok(Entry {
        fingerprint: fingerprint(&value),
        definition: Arc::new(definition),
        handler,
        registered_at: Utc::now(),
    })
}
