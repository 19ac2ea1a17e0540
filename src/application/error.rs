use thiserror::Error;

use crate::domain::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("No current user: pass --as <name> or set CELERY_USER")]
    NoCurrentUser,

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The backing store failed. Writes applied before the failure stay applied.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::UserNotFound(_) | AppError::GroupNotFound(_) | AppError::ExpenseNotFound(_)
        )
    }
}
