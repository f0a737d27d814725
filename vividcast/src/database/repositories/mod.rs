//! Repository layer.

pub mod account;
pub mod ledger;
pub mod ledger_tx;
pub mod subscription;
pub mod task;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use ledger::{LedgerRepository, SqlxLedgerRepository};
pub use ledger_tx::LedgerTxOps;
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use task::{SqlxTaskRepository, TaskRepository};
