//! Domain 模块
//!
//! 领域模型：网络配置、派生路径与密钥派生、交易类型

pub mod chain_config;
pub mod derivation;
pub mod derivation_path;
pub mod transaction;

// 重新导出常用类型
pub use chain_config::{ConnectionStatus, NetworkConfig};
pub use derivation::{AddressEncoding, KeyDerivation, SigningKey};
pub use derivation_path::DerivationPath;
pub use transaction::{FeeModel, GasSuggestion, SignedTx, TxKind, TxOptions, UnsignedTx};
