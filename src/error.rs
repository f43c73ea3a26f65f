use thiserror::Error;

/// Faults raised by the balance-and-key ledger. Anything that rolls a
/// transaction back surfaces as one of these; callers decide how to report.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("user {0} not found")]
    UserNotFound(i32),

    #[error("deposit {0} not found")]
    DepositNotFound(i32),

    #[error("key {0} not found")]
    KeyNotFound(i32),

    #[error("deposit {0} was already processed")]
    AlreadyProcessed(i32),

    #[error("insufficient funds: balance {balance} is below required {required}")]
    InsufficientFunds { required: i64, balance: i64 },

    #[error("unknown pack '{0}'")]
    UnknownPack(String),

    #[error("admin accounts cannot be deleted")]
    ProtectedAccount,

    #[error("could not allocate a unique key code")]
    CodeCollision,

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
