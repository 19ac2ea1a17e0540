use std::collections::HashSet;

use super::{Cents, Debt, Expense, GroupId, UserId, ValidationError};

fn check_unique<'a>(users: impl IntoIterator<Item = &'a UserId>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for user in users {
        if !seen.insert(*user) {
            return Err(ValidationError::DuplicateParticipant(*user));
        }
    }
    Ok(())
}

fn debts_for_shares(
    expense: &Expense,
    shares: impl IntoIterator<Item = (UserId, Cents)>,
    group: Option<GroupId>,
) -> Result<Vec<Debt>, ValidationError> {
    let mut debts = Vec::new();
    for (user, share) in shares {
        // The payer's own share and empty shares produce no obligation.
        if user == expense.payer || share == 0 {
            continue;
        }
        let debt = Debt::new(share, expense.payer, user, expense.id)?;
        debts.push(match group {
            Some(group) => debt.with_group(group),
            None => debt,
        });
    }
    Ok(debts)
}

/// Split the expense total evenly between `participants`.
///
/// The payer may appear among the participants, in which case they carry a
/// share but owe nothing. Leftover cents go one each to the first
/// participants in the given order, so the shares always add up to the total.
pub fn split_evenly(
    expense: &Expense,
    participants: &[UserId],
    group: Option<GroupId>,
) -> Result<Vec<Debt>, ValidationError> {
    if participants.is_empty() {
        return Err(ValidationError::EmptySplit);
    }
    check_unique(participants)?;

    let count = participants.len() as Cents;
    let base = expense.amount_cents / count;
    let remainder = expense.amount_cents % count;

    let shares = participants.iter().enumerate().map(|(index, user)| {
        let extra = if (index as Cents) < remainder { 1 } else { 0 };
        (*user, base + extra)
    });

    debts_for_shares(expense, shares, group)
}

/// Split the expense using explicit per-user shares that must add up to the total.
pub fn split_exact(
    expense: &Expense,
    shares: &[(UserId, Cents)],
    group: Option<GroupId>,
) -> Result<Vec<Debt>, ValidationError> {
    if shares.is_empty() {
        return Err(ValidationError::EmptySplit);
    }
    if let Some((_, negative)) = shares.iter().find(|(_, share)| *share < 0) {
        return Err(ValidationError::NegativeAmount(*negative));
    }
    check_unique(shares.iter().map(|(user, _)| user))?;

    let sum = shares
        .iter()
        .try_fold(0 as Cents, |sum, (_, share)| sum.checked_add(*share))
        .ok_or(ValidationError::AmountOverflow)?;
    if sum != expense.amount_cents {
        return Err(ValidationError::SharesMismatch {
            total: expense.amount_cents,
            shares: sum,
        });
    }

    debts_for_shares(expense, shares.iter().copied(), group)
}
