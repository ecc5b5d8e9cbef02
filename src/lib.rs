//! IronVault - 多链钱包签名引擎
//!
//! 会话托管助记词、确定性密钥派生、交易构建与签名、多网络广播。
//! 助记词、私钥与密码永远不会写入日志或错误消息。

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{EngineError, ErrorKind, Result};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        config::Config,
        domain::{DerivationPath, FeeModel, KeyDerivation, NetworkConfig, TxOptions},
        error::{EngineError, ErrorKind, Result},
        infrastructure::encryption::{CryptoVault, EncryptedBlob},
        service::{Credential, NetworkRegistry, SessionVault, TxOrigin, WalletService},
    };
}
