use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type GroupId = Uuid;

/// A named set of users sharing expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            members: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = UserId>) -> Self {
        self.members.extend(members);
        self
    }

    /// Returns false when the user was already a member.
    pub fn add_member(&mut self, user: UserId) -> bool {
        self.members.insert(user)
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }
}
