//! # Bulwark Council
//!
//! Spend governance for costed AI actions: a cost-tiered voting ladder,
//! three veto domains, and an opaque voting oracle.
//!
//! ## Decision Flow
//!
//! ```text
//!   GovernanceRequest + cost + model
//!                │
//!                ▼
//!   ┌──────────────────────────┐  veto   ┌──────────────────────┐
//!   │ security / resource /    │───────▶ │ denied, veto recorded │
//!   │ financial veto checks    │         └──────────────────────┘
//!   └────────────┬─────────────┘
//!                │ none
//!                ▼
//!   ┌──────────────────────────┐  auto / simple / weighted
//!   │ tier table (by cost)     │──────────────────────────▶ approved
//!   └────────────┬─────────────┘
//!                │ supermajority / super-supermajority
//!                ▼
//!   ┌──────────────────────────┐
//!   │ VotingOracle             │──▶ approved / denied (errors deny)
//!   │ create_vote, close_vote  │
//!   └──────────────────────────┘
//! ```
//!
//! ## Veto Domains
//!
//! | Domain | Fires when | Default ceiling |
//! |--------|-----------|-----------------|
//! | Security | security-sensitive and trust below threshold | `Trusted` |
//! | Resource | estimated tokens above ceiling | 100,000 |
//! | Financial | cost above large-transaction ceiling | $5.00 |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bulwark_audit::{MemoryAuditSink, TrustLevel};
//! use bulwark_council::{
//!     GovernanceRequest, GovernorConfig, LocalCouncil, PolicyGovernor, VotingMechanism,
//! };
//!
//! # tokio_test_block_on(async {
//! let governor = PolicyGovernor::new(
//!     GovernorConfig::default(),
//!     Arc::new(LocalCouncil::default()),
//!     Arc::new(MemoryAuditSink::new()),
//! )
//! .unwrap();
//!
//! let request = GovernanceRequest::new("agent-7", TrustLevel::Standard, "draft a reply");
//! let decision = governor.request_approval(&request, 0.001, "model-small").await;
//! assert!(decision.approved);
//! assert_eq!(decision.mechanism, VotingMechanism::AutoApproved);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod ballot;
pub mod consensus;
pub mod error;
pub mod governor;
pub mod members;
pub mod oracle;

pub use ballot::{Ballot, Decision, VoteRequest};
pub use consensus::{ConsensusEngine, ConsensusResult, VoteTally};
pub use error::{CouncilError, Result};
pub use governor::{
    GovernanceDecision, GovernanceRequest, GovernanceThresholds, GovernorConfig, PolicyGovernor,
    VetoConfig, VetoDomain, VotingMechanism, VotingRatios,
};
pub use members::{default_members, CouncilMember, FinanceReviewer, ResourceReviewer, SecurityReviewer};
pub use oracle::{LocalCouncil, VoteOutcome, VoteStatus, VoteTicket, VotingOracle};
