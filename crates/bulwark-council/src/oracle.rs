//! The voting oracle seam and its in-process implementation.
//!
//! The governor treats the oracle as a black box:
//!
//! ```text
//! create_vote(request) ──▶ VoteTicket { vote_id, status }
//! cast_vote(vote_id, ballot)
//! cast_veto(vote_id, agent, reason)
//! close_vote(vote_id) ──▶ VoteOutcome { approved, tally, vetoed_by, .. }
//! ```
//!
//! A remote council plugs in by implementing [`VotingOracle`].
//! [`LocalCouncil`] tallies ballots from [`CouncilMember`]s through the
//! [`ConsensusEngine`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::ballot::{Ballot, VoteRequest};
use crate::consensus::{ConsensusEngine, ConsensusResult, VoteTally};
use crate::error::{CouncilError, Result};
use crate::members::{default_members, CouncilMember};

/// Lifecycle state of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Open,
    Closed,
}

/// Returned by [`VotingOracle::create_vote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTicket {
    pub vote_id: String,
    pub status: VoteStatus,
}

/// Final result of a closed vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub vote_id: String,
    /// True only if consensus approved and nobody vetoed.
    pub approved: bool,
    pub result: ConsensusResult,
    pub required_ratio: f64,
    pub tally: VoteTally,
    pub vetoed_by: Option<String>,
    pub veto_reason: Option<String>,
}

/// An external council that decides costed requests.
#[async_trait]
pub trait VotingOracle: Send + Sync {
    /// Opens a vote on `request`.
    async fn create_vote(&self, request: VoteRequest) -> Result<VoteTicket>;

    /// Adds (or replaces) a member's ballot on an open vote.
    async fn cast_vote(&self, vote_id: &str, ballot: Ballot) -> Result<()>;

    /// Records a veto. A vetoed vote can never be approved.
    async fn cast_veto(&self, vote_id: &str, agent: &str, reason: &str) -> Result<()>;

    /// Closes the vote and returns the outcome.
    async fn close_vote(&self, vote_id: &str) -> Result<VoteOutcome>;
}

struct OpenVote {
    request: VoteRequest,
    ballots: Vec<Ballot>,
    veto: Option<(String, String)>,
}

/// In-process council.
///
/// Members review the request when the vote is created; further ballots and
/// vetoes may be cast until the vote is closed.
pub struct LocalCouncil {
    members: Vec<Box<dyn CouncilMember>>,
    engine: ConsensusEngine,
    votes: Mutex<HashMap<String, OpenVote>>,
}

impl Default for LocalCouncil {
    fn default() -> Self {
        Self::new(default_members())
    }
}

impl std::fmt::Debug for LocalCouncil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCouncil")
            .field("members", &self.member_names())
            .field("engine", &self.engine)
            .field("open_votes", &self.open_votes())
            .finish()
    }
}

impl LocalCouncil {
    pub fn new(members: Vec<Box<dyn CouncilMember>>) -> Self {
        Self {
            members,
            engine: ConsensusEngine::default(),
            votes: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the consensus engine (e.g. to raise the quorum).
    pub fn with_engine(mut self, engine: ConsensusEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name()).collect()
    }

    /// Number of votes created but not yet closed.
    pub fn open_votes(&self) -> usize {
        self.votes.lock().len()
    }
}

#[async_trait]
impl VotingOracle for LocalCouncil {
    async fn create_vote(&self, request: VoteRequest) -> Result<VoteTicket> {
        let ballots: Vec<Ballot> = self.members.iter().map(|m| m.review(&request)).collect();
        let vote_id = Uuid::new_v4().to_string();
        debug!(vote_id = %vote_id, topic = %request.topic, ballots = ballots.len(), "vote opened");

        self.votes.lock().insert(
            vote_id.clone(),
            OpenVote {
                request,
                ballots,
                veto: None,
            },
        );
        Ok(VoteTicket {
            vote_id,
            status: VoteStatus::Open,
        })
    }

    async fn cast_vote(&self, vote_id: &str, ballot: Ballot) -> Result<()> {
        let mut votes = self.votes.lock();
        let vote = votes
            .get_mut(vote_id)
            .ok_or_else(|| CouncilError::UnknownVote(vote_id.to_string()))?;
        vote.ballots.retain(|b| b.member != ballot.member);
        vote.ballots.push(ballot);
        Ok(())
    }

    async fn cast_veto(&self, vote_id: &str, agent: &str, reason: &str) -> Result<()> {
        let mut votes = self.votes.lock();
        let vote = votes
            .get_mut(vote_id)
            .ok_or_else(|| CouncilError::UnknownVote(vote_id.to_string()))?;
        // First veto stands.
        if vote.veto.is_none() {
            vote.veto = Some((agent.to_string(), reason.to_string()));
        }
        Ok(())
    }

    async fn close_vote(&self, vote_id: &str) -> Result<VoteOutcome> {
        let vote = self
            .votes
            .lock()
            .remove(vote_id)
            .ok_or_else(|| CouncilError::UnknownVote(vote_id.to_string()))?;

        let required_ratio = vote.request.required_ratio;
        let (result, tally) = self.engine.evaluate(vote.ballots, required_ratio);
        let (vetoed_by, veto_reason) = match vote.veto {
            Some((agent, reason)) => (Some(agent), Some(reason)),
            None => (None, None),
        };
        let approved = result == ConsensusResult::Approved && vetoed_by.is_none();

        debug!(
            vote_id = %vote_id,
            ?result,
            ratio = tally.approval_ratio(),
            required_ratio,
            approved,
            "vote closed"
        );

        Ok(VoteOutcome {
            vote_id: vote_id.to_string(),
            approved,
            result,
            required_ratio,
            tally,
            vetoed_by,
            veto_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_audit::TrustLevel;

    fn request(cost: f64, ratio: f64) -> VoteRequest {
        VoteRequest {
            topic: "model call".into(),
            requester_id: "agent-1".into(),
            trust_level: TrustLevel::Standard,
            estimated_cost: cost,
            model: "model-x".into(),
            security_sensitive: false,
            estimated_tokens: 500,
            required_ratio: ratio,
        }
    }

    #[tokio::test]
    async fn test_default_council_approves_clean_request() {
        let council = LocalCouncil::default();
        let ticket = council.create_vote(request(1.5, 0.80)).await.unwrap();
        assert_eq!(ticket.status, VoteStatus::Open);
        assert_eq!(council.open_votes(), 1);

        let outcome = council.close_vote(&ticket.vote_id).await.unwrap();
        assert!(outcome.approved);
        assert_eq!(outcome.result, ConsensusResult::Approved);
        assert_eq!(outcome.tally.approvals, 3);
        assert_eq!(council.open_votes(), 0);
    }

    #[tokio::test]
    async fn test_veto_overrides_approval() {
        let council = LocalCouncil::default();
        let ticket = council.create_vote(request(1.5, 0.67)).await.unwrap();
        council
            .cast_veto(&ticket.vote_id, "security-council", "manual hold")
            .await
            .unwrap();

        let outcome = council.close_vote(&ticket.vote_id).await.unwrap();
        assert_eq!(outcome.result, ConsensusResult::Approved);
        assert!(!outcome.approved);
        assert_eq!(outcome.vetoed_by.as_deref(), Some("security-council"));
    }

    #[tokio::test]
    async fn test_cast_vote_replaces_member_ballot() {
        let council = LocalCouncil::default();
        let ticket = council.create_vote(request(1.5, 0.80)).await.unwrap();
        council
            .cast_vote(&ticket.vote_id, Ballot::reject("finance-reviewer", 5.0, "changed mind"))
            .await
            .unwrap();

        let outcome = council.close_vote(&ticket.vote_id).await.unwrap();
        assert_eq!(outcome.tally.ballots.len(), 3);
        assert_eq!(outcome.tally.rejections, 1);
        assert!(!outcome.approved);
    }

    #[tokio::test]
    async fn test_unknown_and_closed_votes() {
        let council = LocalCouncil::default();
        let err = council.close_vote("missing").await.unwrap_err();
        assert_eq!(err, CouncilError::UnknownVote("missing".into()));

        let ticket = council.create_vote(request(1.0, 0.67)).await.unwrap();
        council.close_vote(&ticket.vote_id).await.unwrap();
        assert!(council.close_vote(&ticket.vote_id).await.is_err());
        assert!(council
            .cast_vote(&ticket.vote_id, Ballot::approve("x", 1.0, ""))
            .await
            .is_err());
    }
}
