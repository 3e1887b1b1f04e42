mod account;
mod customer;
mod ledger;
mod money;
mod operation;

pub use account::*;
pub use customer::*;
pub use ledger::*;
pub use money::*;
pub use operation::*;
