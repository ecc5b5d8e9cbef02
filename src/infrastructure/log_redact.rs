//! 日志脱敏
//!
//! 原始交易与地址在日志中只显示首尾；助记词、私钥与密码从不进入日志。

use ethers::types::{Address, Bytes};

/// 脱敏十六进制字符串（显示前缀和后缀）
pub fn redact_hex_string(hex: &str, show_chars: usize) -> String {
    if hex.len() <= show_chars * 2 || !hex.is_ascii() {
        return "*".repeat(hex.len());
    }

    let prefix = &hex[..show_chars];
    let suffix = &hex[hex.len() - show_chars..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return "*".repeat(address.len());
    }

    let prefix = &address[..6];
    let suffix = &address[address.len() - 4..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏 EVM 地址
pub fn short_address(address: &Address) -> String {
    redact_address(&format!("{:?}", address))
}

/// 原始签名交易：只保留首尾与长度
pub fn redact_raw_tx(raw: &Bytes) -> String {
    let hex = format!("0x{}", hex::encode(raw));
    format!("{} ({} bytes)", redact_hex_string(&hex, 10), raw.len())
}

/// 会话 ID 只显示前 8 位
pub fn redact_session_id(session_id: &str) -> String {
    match session_id.get(..8) {
        Some(prefix) if session_id.len() > 8 => format!("{}…", prefix),
        _ => "*".repeat(session_id.len()),
    }
}
