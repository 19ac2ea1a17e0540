mod activity;
mod aggregate;
mod debt;
mod error;
mod expense;
mod group;
mod ledger;
mod money;
mod split;
mod user;

pub use activity::*;
pub use aggregate::*;
pub use debt::*;
pub use error::*;
pub use expense::*;
pub use group::*;
pub use ledger::*;
pub use money::*;
pub use split::*;
pub use user::*;
