//! 统一错误类型
//!
//! 错误按处理方式分为五类（见 [`ErrorKind`]）：
//! - 校验错误：在任何网络或密码学操作之前拒绝
//! - 托管错误：会话不存在或已过期，调用方应重新认证而不是重新校验输入
//! - 密码学错误：永远失败关闭，不降级
//! - 网络错误：区分"肯定未提交"与"已提交、结果未知"
//! - 致命错误：启动阶段配置缺失
//!
//! 任何错误消息都不包含助记词、私钥或密码。

use serde::Serialize;

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Custody,
    Cryptographic,
    Network,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 校验错误
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient parameters: {0}")]
    InsufficientParameters(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signing key address {actual} does not match transaction sender {expected}")]
    SignerMismatch { expected: String, actual: String },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 托管错误
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 密码学错误
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    #[error("authentication failed: ciphertext, password or key mismatch")]
    AuthenticationFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("signing failed: {0}")]
    Signing(String),

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 网络错误
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("rpc error on {network}: {message}")]
    Rpc { network: String, message: String },

    /// 节点明确拒绝，交易肯定未进入内存池
    #[error("broadcast rejected by {network}: {message}")]
    BroadcastRejected { network: String, message: String },

    /// 请求已发出但未收到确定答复，交易可能已提交。
    /// 重新提交必须使用同一 nonce 与费用参数（即同一签名交易）。
    #[error("broadcast outcome unknown on {network} (tx {tx_hash}, nonce {nonce}): {message}")]
    BroadcastOutcomeUnknown {
        network: String,
        tx_hash: String,
        nonce: String,
        message: String,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 致命错误
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidMnemonic(_)
            | EngineError::InvalidPath(_)
            | EngineError::InvalidAddress(_)
            | EngineError::InvalidAmount(_)
            | EngineError::InsufficientParameters(_)
            | EngineError::InvalidRequest(_)
            | EngineError::SignerMismatch { .. } => ErrorKind::Validation,

            EngineError::SessionNotFound | EngineError::SessionExpired => ErrorKind::Custody,

            EngineError::AuthenticationFailed
            | EngineError::KeyDerivation(_)
            | EngineError::Encryption(_)
            | EngineError::Signing(_) => ErrorKind::Cryptographic,

            EngineError::NetworkNotFound(_)
            | EngineError::NetworkUnavailable(_)
            | EngineError::Rpc { .. }
            | EngineError::BroadcastRejected { .. }
            | EngineError::BroadcastOutcomeUnknown { .. } => ErrorKind::Network,

            EngineError::Configuration(_) => ErrorKind::Fatal,
        }
    }

    /// 稳定的错误码字符串，供 HTTP 层直接透传
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidMnemonic(_) => "invalid_mnemonic",
            EngineError::InvalidPath(_) => "invalid_path",
            EngineError::InvalidAddress(_) => "invalid_address",
            EngineError::InvalidAmount(_) => "invalid_amount",
            EngineError::InsufficientParameters(_) => "insufficient_parameters",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::SignerMismatch { .. } => "signer_mismatch",
            EngineError::SessionNotFound => "session_not_found",
            EngineError::SessionExpired => "session_expired",
            EngineError::AuthenticationFailed => "authentication_failed",
            EngineError::KeyDerivation(_) => "key_derivation_failed",
            EngineError::Encryption(_) => "encryption_failed",
            EngineError::Signing(_) => "signing_failed",
            EngineError::NetworkNotFound(_) => "network_not_found",
            EngineError::NetworkUnavailable(_) => "network_unavailable",
            EngineError::Rpc { .. } => "rpc_error",
            EngineError::BroadcastRejected { .. } => "broadcast_rejected",
            EngineError::BroadcastOutcomeUnknown { .. } => "broadcast_outcome_unknown",
            EngineError::Configuration(_) => "configuration_error",
        }
    }

    /// 4xx 类错误：校验与托管错误
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Custody)
    }

    /// NetworkNotFound 按调用方输入错误处理
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::SessionNotFound | EngineError::NetworkNotFound(_)
        )
    }

    pub(crate) fn rpc(network: &str, message: impl std::fmt::Display) -> Self {
        EngineError::Rpc {
            network: network.to_string(),
            message: message.to_string(),
        }
    }
}

/// 错误的可序列化视图（用于部分成功的响应体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
