//! Token lifecycle scenarios: council-gated destructive tools, replay
//! under concurrency, persistence across restarts.

use std::sync::Arc;
use std::thread;

use bulwark_audit::{AuditAction, MemoryAuditSink, TrustLevel};
use bulwark_council::LocalCouncil;
use bulwark_policy::{
    PolicyConfig, PolicyEngine, TokenDenial, TokenLedger, TokenRejection, TokenRequest,
    TokenVerifier,
};
use bulwark_registry::{CapabilityDefinition, ParamType, PermissionTier, ToolHandler, ToolRegistry};
use serde_json::json;

fn registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new(Arc::new(MemoryAuditSink::new()));
    registry
        .register(
            CapabilityDefinition::new("db_drop", "Drop table", PermissionTier::Destructive)
                .with_parameter("table", ParamType::String, true),
            ToolHandler::Placeholder,
        )
        .unwrap();
    registry
        .register(
            CapabilityDefinition::new("note_write", "Write note", PermissionTier::Write)
                .with_parameter("text", ParamType::String, true),
            ToolHandler::Placeholder,
        )
        .unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn destructive_tokens_go_through_the_council() {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = PolicyEngine::new(
        PolicyConfig::default().with_council_for_destructive(true),
        registry(),
        TokenLedger::temporary().unwrap(),
        audit.clone(),
    )
    .unwrap()
    .with_oracle(Arc::new(LocalCouncil::default()));

    let request = TokenRequest::new(
        "ops-agent",
        TrustLevel::Elevated,
        "db_drop",
        json!({"table": "scratch"}),
    );
    let token = engine.issue_token(&request).await.unwrap();
    assert_eq!(token.trust_level, TrustLevel::Elevated);

    // Lower the bar for destructive tools so the council is the only gate.
    let lenient = PolicyEngine::new(
        PolicyConfig::default()
            .with_council_for_destructive(true)
            .with_min_trust(bulwark_policy::TierTrust {
                destructive: TrustLevel::Standard,
                ..Default::default()
            }),
        registry(),
        TokenLedger::temporary().unwrap(),
        audit.clone(),
    )
    .unwrap()
    .with_oracle(Arc::new(LocalCouncil::default()));

    let request = TokenRequest::new("ops-agent", TrustLevel::Standard, "db_drop", json!({"table": "users"}));
    let denial = lenient.issue_token(&request).await.unwrap_err();
    assert!(matches!(denial, TokenDenial::CouncilRejected(_)), "{denial:?}");
    assert_eq!(audit.count_action(AuditAction::TokenDenied), 1);
}

#[tokio::test]
async fn concurrent_replay_consumes_once() {
    let engine = Arc::new(
        PolicyEngine::new(
            PolicyConfig::default(),
            registry(),
            TokenLedger::temporary().unwrap(),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap(),
    );
    let request = TokenRequest::new("writer", TrustLevel::Standard, "note_write", json!({"text": "hi"}));
    let token = engine.issue_token(&request).await.unwrap();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            let token = token.clone();
            thread::spawn(move || engine.mark_token_used(&token))
        })
        .collect();
    let consumed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(consumed, 1);
    assert_eq!(
        engine.verify_token(&token, &json!({"text": "hi"})),
        Err(TokenRejection::AlreadyUsed)
    );
}

#[tokio::test]
async fn used_tokens_stay_used_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");
    let key = "5a".repeat(32);
    let request = TokenRequest::new("writer", TrustLevel::Standard, "note_write", json!({"text": "hi"}));

    let token = {
        let engine = PolicyEngine::new(
            PolicyConfig::default().with_signing_key(key.clone()),
            registry(),
            TokenLedger::open(&path).unwrap(),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap();
        let token = engine.issue_token(&request).await.unwrap();
        assert!(engine.mark_token_used(&token));
        engine.ledger().flush().unwrap();
        token
    };

    let engine = PolicyEngine::new(
        PolicyConfig::default().with_signing_key(key),
        registry(),
        TokenLedger::open(&path).unwrap(),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();
    assert_eq!(
        engine.verify_token(&token, &json!({"text": "hi"})),
        Err(TokenRejection::AlreadyUsed)
    );
    assert!(!engine.mark_token_used(&token));
}
