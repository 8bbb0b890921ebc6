//! Weighted consensus engine.
//!
//! Each ballot carries a weight. The approval ratio is
//! `approve_weight / (approve_weight + reject_weight)`; abstentions are
//! excluded from both the ratio and the quorum. Anything short of the
//! required ratio is a rejection.

use serde::{Deserialize, Serialize};

use crate::ballot::{Ballot, Decision};

/// Result of a consensus vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusResult {
    Approved,
    Rejected,
    /// Too few non-abstaining voters.
    NoConsensus,
}

/// Weighted tally of ballots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approvals: usize,
    pub rejections: usize,
    pub abstentions: usize,
    pub approve_weight: f64,
    pub reject_weight: f64,
    pub ballots: Vec<Ballot>,
}

impl VoteTally {
    pub fn from_ballots(ballots: Vec<Ballot>) -> Self {
        let mut tally = Self {
            approvals: 0,
            rejections: 0,
            abstentions: 0,
            approve_weight: 0.0,
            reject_weight: 0.0,
            ballots: Vec::new(),
        };
        for ballot in &ballots {
            match ballot.decision {
                Decision::Approve => {
                    tally.approvals += 1;
                    tally.approve_weight += ballot.weight;
                }
                Decision::Reject => {
                    tally.rejections += 1;
                    tally.reject_weight += ballot.weight;
                }
                Decision::Abstain => tally.abstentions += 1,
            }
        }
        tally.ballots = ballots;
        tally
    }

    /// Members that did not abstain.
    pub fn voting_members(&self) -> usize {
        self.approvals + self.rejections
    }

    /// Weighted approval ratio, 0.0 when nobody voted.
    pub fn approval_ratio(&self) -> f64 {
        let total = self.approve_weight + self.reject_weight;
        if total <= 0.0 {
            0.0
        } else {
            self.approve_weight / total
        }
    }
}

/// Consensus voting engine.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    min_voters: usize,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ConsensusEngine {
    pub fn new(min_voters: usize) -> Self {
        Self { min_voters }
    }

    pub fn min_voters(&self) -> usize {
        self.min_voters
    }

    /// Tallies `ballots` against `required_ratio`.
    pub fn evaluate(&self, ballots: Vec<Ballot>, required_ratio: f64) -> (ConsensusResult, VoteTally) {
        let tally = VoteTally::from_ballots(ballots);

        if tally.voting_members() < self.min_voters {
            return (ConsensusResult::NoConsensus, tally);
        }

        let result = if tally.approval_ratio() >= required_ratio {
            ConsensusResult::Approved
        } else {
            ConsensusResult::Rejected
        };
        (result, tally)
    }
}
