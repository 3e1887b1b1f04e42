// Application layer: use cases over the store.
// Every public LedgerService call is one store transaction.

pub mod config;
pub mod error;
pub mod history;
pub mod service;

pub use config::*;
pub use error::*;
pub use history::*;
pub use service::*;
