pub mod gas_oracle;
pub mod network_registry;
pub mod nonce_tracker;
pub mod session_vault;
pub mod transaction_builder;
pub mod transaction_signer;
pub mod wallet_service;

pub use gas_oracle::GasOracle;
pub use network_registry::{CrossChainBalance, NetworkRegistry};
pub use nonce_tracker::NonceTracker;
pub use session_vault::SessionVault;
pub use transaction_builder::TransactionBuilder;
pub use transaction_signer::TransactionSigner;
pub use wallet_service::{Credential, SubmittedTx, TxOrigin, WalletService};
