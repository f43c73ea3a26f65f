pub use super::deposits::Entity as Deposits;
pub use super::keys::Entity as Keys;
pub use super::ledger_entries::Entity as LedgerEntries;
pub use super::users::Entity as Users;
