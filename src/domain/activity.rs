use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type ActivityId = Uuid;

/// What kind of record an activity points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Expense,
    Debt,
    Group,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Expense => "expense",
            ActivityType::Debt => "debt",
            ActivityType::Group => "group",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "expense" => Some(ActivityType::Expense),
            "debt" => Some(ActivityType::Debt),
            "group" => Some(ActivityType::Group),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Pay,
    Settle,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Delete => "delete",
            ActivityAction::Pay => "pay",
            ActivityAction::Settle => "settle",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(ActivityAction::Create),
            "update" => Some(ActivityAction::Update),
            "delete" => Some(ActivityAction::Delete),
            "pay" => Some(ActivityAction::Pay),
            "settle" => Some(ActivityAction::Settle),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    /// User who performed the action
    pub actor: UserId,
    /// Expense, debt or group id depending on `activity_type`
    pub reference: Uuid,
    pub activity_type: ActivityType,
    pub action: ActivityAction,
    /// The other user affected, if any
    pub related_user: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        actor: UserId,
        reference: Uuid,
        activity_type: ActivityType,
        action: ActivityAction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            reference,
            activity_type,
            action,
            related_user: None,
            timestamp,
        }
    }

    pub fn with_related_user(mut self, user: UserId) -> Self {
        self.related_user = Some(user);
        self
    }
}
