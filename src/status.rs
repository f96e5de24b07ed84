//! Proposal lifecycle status and the matching indexer filters.
//!
//! Intervals are inclusive at the lower bound and exclusive at the upper
//! bound: a proposal is ACTIVE from `start_date` included until `end_date`
//! excluded. The indexer filters below are the exact complements of
//! [`compute_status`], so pre-filtered lists never disagree with the status
//! recomputed on each record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Active,
    Executed,
    Succeeded,
    Defeated,
}

impl ProposalStatus {
    /// Position in the lifecycle; terminal states share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            ProposalStatus::Pending => 0,
            ProposalStatus::Active => 1,
            ProposalStatus::Executed | ProposalStatus::Succeeded | ProposalStatus::Defeated => 2,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Active => "ACTIVE",
            ProposalStatus::Executed => "EXECUTED",
            ProposalStatus::Succeeded => "SUCCEEDED",
            ProposalStatus::Defeated => "DEFEATED",
        };
        f.write_str(name)
    }
}

pub fn compute_status(
    now: DateTime<Utc>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    executed: bool,
    executable: bool,
) -> ProposalStatus {
    if now < start_date {
        ProposalStatus::Pending
    } else if now < end_date {
        ProposalStatus::Active
    } else if executed {
        ProposalStatus::Executed
    } else if executable {
        ProposalStatus::Succeeded
    } else {
        ProposalStatus::Defeated
    }
}

/// Indexer-side predicate selecting the proposals in one status at `now`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    pub start_date_gt: Option<i64>,
    pub start_date_lte: Option<i64>,
    pub end_date_gt: Option<i64>,
    pub end_date_lte: Option<i64>,
    pub executed: Option<bool>,
    pub executable: Option<bool>,
}

impl StatusFilter {
    pub fn for_status(status: ProposalStatus, now: DateTime<Utc>) -> Self {
        let now = now.timestamp();
        let ended = |executed: bool, executable: Option<bool>| StatusFilter {
            start_date_lte: Some(now),
            end_date_lte: Some(now),
            executed: Some(executed),
            executable,
            ..StatusFilter::default()
        };

        match status {
            ProposalStatus::Pending => StatusFilter {
                start_date_gt: Some(now),
                ..StatusFilter::default()
            },
            ProposalStatus::Active => StatusFilter {
                start_date_lte: Some(now),
                end_date_gt: Some(now),
                ..StatusFilter::default()
            },
            ProposalStatus::Executed => ended(true, None),
            ProposalStatus::Succeeded => ended(false, Some(true)),
            ProposalStatus::Defeated => ended(false, Some(false)),
        }
    }

    /// Evaluate the predicate locally over unix-second timestamps
    pub fn matches(&self, start_date: i64, end_date: i64, executed: bool, executable: bool) -> bool {
        self.start_date_gt.map_or(true, |t| start_date > t)
            && self.start_date_lte.map_or(true, |t| start_date <= t)
            && self.end_date_gt.map_or(true, |t| end_date > t)
            && self.end_date_lte.map_or(true, |t| end_date <= t)
            && self.executed.map_or(true, |e| executed == e)
            && self.executable.map_or(true, |e| executable == e)
    }

    /// GraphQL `where` entries; `executable_field` is the indexer's name for
    /// the "threshold reached" flag of the plugin family
    pub fn to_where(&self, executable_field: &str) -> Map<String, Value> {
        let mut filter = Map::new();
        let mut put = |key: &str, value: Value| {
            filter.insert(key.to_string(), value);
        };

        if let Some(t) = self.start_date_gt {
            put("startDate_gt", json!(t.to_string()));
        }
        if let Some(t) = self.start_date_lte {
            put("startDate_lte", json!(t.to_string()));
        }
        if let Some(t) = self.end_date_gt {
            put("endDate_gt", json!(t.to_string()));
        }
        if let Some(t) = self.end_date_lte {
            put("endDate_lte", json!(t.to_string()));
        }
        if let Some(executed) = self.executed {
            put("executed", json!(executed));
        }
        if let Some(executable) = self.executable {
            put(executable_field, json!(executable));
        }
        filter
    }
}
