use thiserror::Error;

use super::{Cents, MAX_AMOUNT_CENTS, UserId};

/// Rejections raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must not be negative: {0}")]
    NegativeAmount(Cents),

    #[error("amount {0} exceeds the maximum of {max}", max = MAX_AMOUNT_CENTS)]
    AmountTooLarge(Cents),

    #[error("amounts overflow when added together")]
    AmountOverflow,

    #[error("user {0} cannot owe themselves")]
    SelfReferentialDebt(UserId),

    #[error("an expense must be split between at least one participant")]
    EmptySplit,

    #[error("participant {0} appears more than once in the split")]
    DuplicateParticipant(UserId),

    #[error("shares add up to {shares} but the expense total is {total}")]
    SharesMismatch { total: Cents, shares: Cents },

    #[error("user {actor} is not a party to the settlement")]
    ActorNotParty { actor: UserId },

    #[error("user {user} is not a member of the group")]
    NotGroupMember { user: UserId },
}
