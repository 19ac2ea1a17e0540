use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Activity, ActivityAction, ActivityType, Cents, Debt, Expense, ExpenseId, UserId,
    ValidationError,
};

/// A user's position over a set of unpaid debts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Sum others owe the user
    pub owed: Cents,
    /// Sum the user owes others
    pub owe: Cents,
    /// `owed - owe`
    pub total: Cents,
}

impl Balance {
    // Saturating: a fold over stored debts must not panic on extreme sums.
    fn credit(self, amount: Cents) -> Self {
        Self {
            owed: self.owed.saturating_add(amount),
            total: self.total.saturating_add(amount),
            ..self
        }
    }

    fn debit(self, amount: Cents) -> Self {
        Self {
            owe: self.owe.saturating_add(amount),
            total: self.total.saturating_sub(amount),
            ..self
        }
    }

    /// Nothing is owed in either direction.
    pub fn is_settled(&self) -> bool {
        self.owed == 0 && self.owe == 0
    }
}

/// Fold unpaid debts into a balance from `perspective`'s point of view.
/// Debts the user is not a party to contribute nothing.
pub fn compute_balance<'a>(
    debts: impl IntoIterator<Item = &'a Debt>,
    perspective: UserId,
) -> Balance {
    debts
        .into_iter()
        .filter(|debt| !debt.paid)
        .fold(Balance::default(), |balance, debt| {
            if debt.creditor == perspective {
                balance.credit(debt.amount_cents)
            } else if debt.debtor == perspective {
                balance.debit(debt.amount_cents)
            } else {
                balance
            }
        })
}

/// Net position of every user appearing in an unpaid debt.
pub fn compute_all_balances<'a>(
    debts: impl IntoIterator<Item = &'a Debt>,
) -> HashMap<UserId, Cents> {
    let mut balances: HashMap<UserId, Cents> = HashMap::new();

    for debt in debts.into_iter().filter(|debt| !debt.paid) {
        let creditor = balances.entry(debt.creditor).or_insert(0);
        *creditor = creditor.saturating_add(debt.amount_cents);
        let debtor = balances.entry(debt.debtor).or_insert(0);
        *debtor = debtor.saturating_sub(debt.amount_cents);
    }

    balances
}

/// What `a` is owed by `b`, net of what `a` owes `b`. Negative means `a` owes.
pub fn pair_balance(debts: &[Debt], a: UserId, b: UserId) -> Cents {
    compute_balance(debts.iter().filter(|debt| debt.is_between(a, b)), a).total
}

/// An expense is settled once no unpaid debt references it.
pub fn is_fully_settled(expense: ExpenseId, debts: &[Debt]) -> bool {
    debts
        .iter()
        .filter(|debt| debt.expense == expense)
        .all(|debt| debt.paid)
}

/// Action recorded when `actor` closes `debt`.
///
/// A debtor clearing what they owe is recorded as `settle`; a creditor
/// marking a debt to them as received is recorded as `pay`.
pub fn settlement_action(actor: UserId, debt: &Debt) -> ActivityAction {
    if debt.debtor == actor {
        ActivityAction::Settle
    } else {
        ActivityAction::Pay
    }
}

/// State transitions produced by a settlement, ready to be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Debts that flipped from unpaid to paid
    pub debts: Vec<Debt>,
    /// Expenses that became fully settled
    pub expenses: Vec<Expense>,
    pub activities: Vec<Activity>,
}

impl Settlement {
    pub fn is_empty(&self) -> bool {
        self.debts.is_empty() && self.expenses.is_empty()
    }

    pub fn settled_amount(&self) -> Cents {
        self.debts
            .iter()
            .fold(0, |sum, debt| sum.saturating_add(debt.amount_cents))
    }
}

/// Settle every outstanding debt between `debtor` and `creditor`.
///
/// `debts` must hold the complete debt set of each expense involved, not only
/// the pair's debts, otherwise an expense could be marked paid while another
/// participant still owes on it. `expenses` supplies the records whose paid
/// flag may flip; expenses missing from it are left alone.
///
/// Debts already paid are skipped, so re-running with the same input is a
/// no-op.
pub fn settle_payment(
    actor: UserId,
    debtor: UserId,
    creditor: UserId,
    debts: &[Debt],
    expenses: &[Expense],
    now: DateTime<Utc>,
) -> Result<Settlement, ValidationError> {
    if debtor == creditor {
        return Err(ValidationError::SelfReferentialDebt(debtor));
    }
    if actor != debtor && actor != creditor {
        return Err(ValidationError::ActorNotParty { actor });
    }
    let other = if actor == debtor { creditor } else { debtor };

    let mut after = debts.to_vec();
    let mut touched: Vec<ExpenseId> = Vec::new();
    let mut updated = Vec::new();

    for debt in after
        .iter_mut()
        .filter(|debt| debt.is_between(debtor, creditor))
    {
        if !touched.contains(&debt.expense) {
            touched.push(debt.expense);
        }
        if debt.mark_paid() {
            updated.push(debt.clone());
        }
    }

    let settled_expenses: Vec<Expense> = touched
        .iter()
        .filter_map(|id| expenses.iter().find(|expense| expense.id == *id))
        .filter(|expense| !expense.paid && is_fully_settled(expense.id, &after))
        .map(|expense| {
            let mut expense = expense.clone();
            expense.mark_paid();
            expense
        })
        .collect();

    let mut activities: Vec<Activity> = updated
        .iter()
        .map(|debt| {
            Activity::new(
                actor,
                debt.id,
                ActivityType::Debt,
                settlement_action(actor, debt),
                now,
            )
            .with_related_user(other)
        })
        .collect();

    activities.extend(settled_expenses.iter().map(|expense| {
        Activity::new(
            actor,
            expense.id,
            ActivityType::Expense,
            ActivityAction::Pay,
            now,
        )
        .with_related_user(other)
    }));

    Ok(Settlement {
        debts: updated,
        expenses: settled_expenses,
        activities,
    })
}
