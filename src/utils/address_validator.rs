//! 地址验证模块
//!
//! EVM 地址解析：0x + 40 位十六进制；含大写字母时按 EIP-55 校验和验证。

use ethers::types::Address;
use sha3::{Digest, Keccak256};

use crate::error::{EngineError, Result};

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 解析并验证 EVM 地址
    pub fn parse_evm(address: &str) -> Result<Address> {
        let address = address.trim();
        let hex_part = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .ok_or_else(|| invalid(address, "missing 0x prefix"))?;

        if hex_part.len() != 40 {
            return Err(invalid(address, "expected 40 hex characters"));
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid(address, "non-hex character"));
        }

        // 全小写或全大写不携带校验和
        let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
            && hex_part.chars().any(|c| c.is_ascii_lowercase());
        if mixed_case && !Self::verify_eip55_checksum(hex_part) {
            return Err(invalid(address, "EIP-55 checksum mismatch"));
        }

        let bytes = hex::decode(hex_part).map_err(|_| invalid(address, "non-hex character"))?;
        Ok(Address::from_slice(&bytes))
    }

    pub fn is_valid_evm(address: &str) -> bool {
        Self::parse_evm(address).is_ok()
    }

    /// 验证 EIP-55 Checksum
    /// https://eips.ethereum.org/EIPS/eip-55
    fn verify_eip55_checksum(hex_part: &str) -> bool {
        let hash = Keccak256::digest(hex_part.to_lowercase().as_bytes());

        hex_part.chars().enumerate().all(|(i, ch)| {
            if !ch.is_ascii_alphabetic() {
                return true;
            }
            let hash_byte = hash[i / 2];
            let nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };
            ch.is_ascii_uppercase() == (nibble >= 8)
        })
    }
}

fn invalid(address: &str, reason: &str) -> EngineError {
    EngineError::InvalidAddress(format!("{}: {}", address, reason))
}
