//! 金额解析
//!
//! 线上金额一律为最小单位的十进制字符串（只含数字），解析为 U256，
//! 不允许符号、小数、十六进制或溢出。

use ethers::types::U256;

use crate::error::{EngineError, Result};

/// 解析十进制金额字符串
pub fn parse_amount(raw: &str) -> Result<U256> {
    parse_decimal(raw).map_err(|reason| EngineError::InvalidAmount(format!("{:?}: {}", raw, reason)))
}

/// 解析可选的十进制数值字段（gas、nonce 等）
pub fn parse_optional(raw: Option<&str>, field: &str) -> Result<Option<U256>> {
    raw.map(|value| {
        parse_decimal(value).map_err(|reason| {
            EngineError::InvalidAmount(format!("{} {:?}: {}", field, value, reason))
        })
    })
    .transpose()
}

/// 解析可选的十进制整数字段（ttl、派生起点等），超出目标类型范围即报错
pub fn parse_optional_int<T: TryFrom<u64>>(raw: Option<&str>, field: &str) -> Result<Option<T>> {
    parse_optional(raw, field)?
        .map(|value| {
            let out_of_range =
                || EngineError::InvalidAmount(format!("{} {}: out of range", field, value));
            if value > U256::from(u64::MAX) {
                return Err(out_of_range());
            }
            T::try_from(value.as_u64()).map_err(|_| out_of_range())
        })
        .transpose()
}

/// U256 → 十进制字符串
pub fn format_amount(value: U256) -> String {
    value.to_string()
}

fn parse_decimal(raw: &str) -> std::result::Result<U256, &'static str> {
    if raw.is_empty() {
        return Err("empty");
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err("only decimal digits are allowed");
    }
    U256::from_dec_str(raw).map_err(|_| "exceeds 256 bits")
}
