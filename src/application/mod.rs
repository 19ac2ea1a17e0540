// Application layer - use cases orchestrating the store, the identity
// provider and the ledger computations.

pub mod error;
pub mod identity;
pub mod service;

pub use error::*;
pub use identity::*;
pub use service::*;
