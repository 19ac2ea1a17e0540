use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ExpenseId, GroupId, MAX_AMOUNT_CENTS, UserId, ValidationError};

pub type DebtId = Uuid;

/// One directional obligation: `debtor` owes `creditor` `amount_cents` for a
/// share of `expense`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub id: DebtId,
    pub amount_cents: Cents,
    pub creditor: UserId,
    pub debtor: UserId,
    pub expense: ExpenseId,
    pub paid: bool,
    pub group: Option<GroupId>,
}

impl Debt {
    pub fn new(
        amount_cents: Cents,
        creditor: UserId,
        debtor: UserId,
        expense: ExpenseId,
    ) -> Result<Self, ValidationError> {
        if amount_cents < 0 {
            return Err(ValidationError::NegativeAmount(amount_cents));
        }
        if amount_cents > MAX_AMOUNT_CENTS {
            return Err(ValidationError::AmountTooLarge(amount_cents));
        }
        if creditor == debtor {
            return Err(ValidationError::SelfReferentialDebt(creditor));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            amount_cents,
            creditor,
            debtor,
            expense,
            paid: false,
            group: None,
        })
    }

    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Paid is a one-way transition. Returns true only on the false -> true flip.
    pub fn mark_paid(&mut self) -> bool {
        let changed = !self.paid;
        self.paid = true;
        changed
    }

    /// True when the debt runs between `a` and `b`, in either direction.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.creditor == a && self.debtor == b) || (self.creditor == b && self.debtor == a)
    }

    /// The other side of the debt from `user`'s point of view.
    pub fn counterparty(&self, user: UserId) -> Option<UserId> {
        if self.creditor == user {
            Some(self.debtor)
        } else if self.debtor == user {
            Some(self.creditor)
        } else {
            None
        }
    }
}
