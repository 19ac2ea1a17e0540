use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, MAX_AMOUNT_CENTS, UserId, ValidationError};

pub type ExpenseId = Uuid;

/// A purchase paid by one user and shared with others.
///
/// Expenses are written once; the only later change is the `paid` flag,
/// which flips when every debt referencing the expense has been settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    /// Total amount in cents, payer's own share included
    pub amount_cents: Cents,
    pub payer: UserId,
    pub category: Option<String>,
    /// When the expense happened in the real world
    pub date: DateTime<Utc>,
    pub paid: bool,
    /// When the expense was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        description: impl Into<String>,
        amount_cents: Cents,
        payer: UserId,
        date: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if amount_cents < 0 {
            return Err(ValidationError::NegativeAmount(amount_cents));
        }
        if amount_cents > MAX_AMOUNT_CENTS {
            return Err(ValidationError::AmountTooLarge(amount_cents));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            description: description.into(),
            amount_cents,
            payer,
            category: None,
            date,
            paid: false,
            recorded_at: Utc::now(),
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Flip the expense to paid. Returns false if it already was.
    pub fn mark_paid(&mut self) -> bool {
        let changed = !self.paid;
        self.paid = true;
        changed
    }
}
