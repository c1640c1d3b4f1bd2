pub mod holding;
pub mod summary;
pub mod transaction;

pub use holding::{AssetType, Holding, HoldingKey, normalize_symbol};
pub use summary::{HoldingDrift, HoldingValuation, PortfolioSummary};
pub use transaction::{NewTransaction, TransactionKind, TransactionRecord, TransactionRequest};
