pub mod deposit;
pub mod key;
pub mod ledger;
pub mod user;
