//! Balance views over a debt collection: per group, per counterparty, per
//! group member. Each one filters and hands the rest to [`compute_balance`].

use std::collections::BTreeMap;

use super::{Balance, Debt, Group, GroupId, UserId, compute_balance};

/// `user`'s balance restricted to debts recorded in `group`.
pub fn group_balance(debts: &[Debt], group: GroupId, user: UserId) -> Balance {
    compute_balance(
        debts.iter().filter(|debt| debt.group == Some(group)),
        user,
    )
}

/// `user`'s balance with a single counterparty, across all groups.
pub fn counterparty_balance(debts: &[Debt], user: UserId, counterparty: UserId) -> Balance {
    compute_balance(
        debts.iter().filter(|debt| debt.is_between(user, counterparty)),
        user,
    )
}

/// One balance per counterparty `user` has an unpaid debt with.
pub fn balances_by_counterparty(debts: &[Debt], user: UserId) -> BTreeMap<UserId, Balance> {
    let mut by_counterparty: BTreeMap<UserId, Vec<&Debt>> = BTreeMap::new();
    for debt in debts.iter().filter(|debt| !debt.paid) {
        if let Some(other) = debt.counterparty(user) {
            by_counterparty.entry(other).or_default().push(debt);
        }
    }

    by_counterparty
        .into_iter()
        .map(|(other, debts)| (other, compute_balance(debts, user)))
        .collect()
}

/// Balance of every member of `group`, members without debts included.
pub fn group_member_balances(debts: &[Debt], group: &Group) -> BTreeMap<UserId, Balance> {
    group
        .members
        .iter()
        .map(|member| (*member, group_balance(debts, group.id, *member)))
        .collect()
}
