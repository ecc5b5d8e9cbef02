//! 密钥派生
//!
//! 助记词 → BIP39 种子 → BIP32 主密钥 → 逐级子密钥派生 → 链地址编码
//!
//! 同一 (助记词, 路径) 永远得到同一 (地址, 签名密钥)，跨进程重启亦然。

use std::fmt;

use bip39::{Language, Mnemonic};
use coins_bip32::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::domain::derivation_path::{DerivationPath, HARDENED_OFFSET};
use crate::error::{EngineError, Result};

/// derive_range 单次最多派生的地址数
pub const MAX_RANGE_COUNT: u32 = 100;

/// 地址编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressEncoding {
    /// EVM：keccak256(未压缩公钥)[12..]，EIP-55 校验和
    Evm,
    /// Bitcoin P2WPKH（bc1q...）
    BitcoinSegwit,
    /// Solana：SLIP-0010 ed25519，Base58 公钥
    Solana,
}

/// secp256k1 签名密钥
///
/// 只存在于进程内存中，Debug 输出不包含密钥内容
#[derive(Clone)]
pub struct SigningKey(k256::ecdsa::SigningKey);

impl SigningKey {
    pub fn address(&self) -> Address {
        evm_address(&self.0)
    }

    /// 绑定链 ID 的 ethers 签名器（EIP-155）
    pub fn wallet(&self, chain_id: u64) -> LocalWallet {
        LocalWallet::from(self.0.clone()).with_chain_id(chain_id)
    }

    pub(crate) fn as_k256(&self) -> &k256::ecdsa::SigningKey {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// 密钥派生器
#[derive(Clone, Default)]
pub struct KeyDerivation {
    /// BIP39 密码短语，默认为空
    passphrase: Zeroizing<String>,
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivation")
            .field("passphrase", &!self.passphrase.is_empty())
            .finish()
    }
}

impl KeyDerivation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用调用方提供的 BIP39 密码短语（同一助记词将得到完全不同的钱包）
    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    /// 校验助记词（词表与校验和）
    pub fn validate_mnemonic(mnemonic: &str) -> Result<()> {
        parse_mnemonic(mnemonic).map(|_| ())
    }

    /// 助记词 → 64 字节 BIP39 种子
    pub fn seed(&self, mnemonic: &str) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = parse_mnemonic(mnemonic)?;
        Ok(Zeroizing::new(mnemonic.to_seed(self.passphrase.as_str())))
    }

    /// 派生 EVM 地址
    pub fn derive_address(&self, mnemonic: &str, path: &DerivationPath) -> Result<Address> {
        Ok(self.derive_signing_key(mnemonic, path)?.address())
    }

    /// 派生 secp256k1 签名密钥
    pub fn derive_signing_key(&self, mnemonic: &str, path: &DerivationPath) -> Result<SigningKey> {
        let seed = self.seed(mnemonic)?;
        let xpriv = derive_xpriv(seed.as_slice(), path)?;
        let key: &k256::ecdsa::SigningKey = xpriv.as_ref();
        Ok(SigningKey(key.clone()))
    }

    /// 在前缀下派生 [start, start + count) 范围内的 EVM 地址
    pub fn derive_range(
        &self,
        mnemonic: &str,
        prefix: &DerivationPath,
        start: u32,
        count: u32,
    ) -> Result<Vec<Address>> {
        if count == 0 || count > MAX_RANGE_COUNT {
            return Err(EngineError::InvalidRequest(format!(
                "count must be between 1 and {}",
                MAX_RANGE_COUNT
            )));
        }
        match start.checked_add(count) {
            Some(end) if end <= HARDENED_OFFSET => {}
            _ => {
                return Err(EngineError::InvalidPath(format!(
                    "range {}..+{} exceeds non-hardened index space",
                    start, count
                )))
            }
        }

        // 前缀只派生一次
        let seed = self.seed(mnemonic)?;
        let parent = derive_xpriv(seed.as_slice(), prefix)?;

        (start..start + count)
            .map(|index| {
                let child = parent
                    .derive_child(index)
                    .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
                let key: &k256::ecdsa::SigningKey = child.as_ref();
                Ok(evm_address(key))
            })
            .collect()
    }

    /// 按链编码派生地址
    pub fn derive_chain_address(
        &self,
        mnemonic: &str,
        path: &DerivationPath,
        encoding: AddressEncoding,
    ) -> Result<String> {
        match encoding {
            AddressEncoding::Evm => Ok(ethers::utils::to_checksum(
                &self.derive_address(mnemonic, path)?,
                None,
            )),
            AddressEncoding::BitcoinSegwit => {
                let key = self.derive_signing_key(mnemonic, path)?;
                bitcoin_p2wpkh(key.as_k256())
            }
            AddressEncoding::Solana => {
                let seed = self.seed(mnemonic)?;
                let secret = slip10_ed25519(seed.as_slice(), path)?;
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&secret);
                Ok(bs58::encode(signing_key.verifying_key().to_bytes()).into_string())
            }
        }
    }
}

fn parse_mnemonic(mnemonic: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in(Language::English, mnemonic)
        .map_err(|e| EngineError::InvalidMnemonic(e.to_string()))
}

fn derive_xpriv(seed: &[u8], path: &DerivationPath) -> Result<XPriv> {
    let mut key = XPriv::root_from_seed(seed, None)
        .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
    for segment in path.segments() {
        key = key
            .derive_child(segment.raw())
            .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
    }
    Ok(key)
}

fn evm_address(key: &k256::ecdsa::SigningKey) -> Address {
    let public_key = key.verifying_key().to_encoded_point(false);
    // 去掉 0x04 前缀后取 keccak256 的后 20 字节
    let hash = Keccak256::digest(&public_key.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

fn bitcoin_p2wpkh(key: &k256::ecdsa::SigningKey) -> Result<String> {
    use bitcoin::{secp256k1, Address as BtcAddress, Network, PublicKey};

    let compressed = key.verifying_key().to_encoded_point(true);
    let secp_pubkey = secp256k1::PublicKey::from_slice(compressed.as_bytes())
        .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
    let address = BtcAddress::p2wpkh(&PublicKey::new(secp_pubkey), Network::Bitcoin)
        .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
    Ok(address.to_string())
}

/// SLIP-0010 ed25519 派生，只允许硬化路径
fn slip10_ed25519(seed: &[u8], path: &DerivationPath) -> Result<[u8; 32]> {
    if !path.is_fully_hardened() {
        return Err(EngineError::InvalidPath(format!(
            "ed25519 derivation requires hardened segments only: {}",
            path
        )));
    }

    let mut node = hmac_sha512(b"ed25519 seed", &[seed])?;
    for segment in path.segments() {
        let (key, chain_code) = node.split_at(32);
        node = hmac_sha512(chain_code, &[&[0u8], key, &segment.raw().to_be_bytes()])?;
    }

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&node[..32]);
    Ok(secret)
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn path(s: &str) -> DerivationPath {
        DerivationPath::parse(s).unwrap()
    }

    #[test]
    fn test_ethereum_vector() {
        let kd = KeyDerivation::new();
        let address = kd
            .derive_chain_address(TEST_MNEMONIC, &path("m/44'/60'/0'/0/0"), AddressEncoding::Evm)
            .unwrap();
        assert_eq!(address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
    }

    #[test]
    fn test_bitcoin_segwit_vector() {
        let kd = KeyDerivation::new();
        let address = kd
            .derive_chain_address(
                TEST_MNEMONIC,
                &path("m/84'/0'/0'/0/0"),
                AddressEncoding::BitcoinSegwit,
            )
            .unwrap();
        assert_eq!(address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
    }

    #[test]
    fn test_signing_key_matches_address() {
        let kd = KeyDerivation::new();
        let p = path("m/44'/60'/0'/0/3");
        let key = kd.derive_signing_key(TEST_MNEMONIC, &p).unwrap();
        assert_eq!(key.address(), kd.derive_address(TEST_MNEMONIC, &p).unwrap());
        assert!(!format!("{:?}", key).contains(&hex::encode(key.as_k256().to_bytes())));
    }

    #[test]
    fn test_range_matches_single_derivation() {
        let kd = KeyDerivation::new();
        let prefix = path("m/44'/60'/0'/0");
        let addresses = kd.derive_range(TEST_MNEMONIC, &prefix, 2, 3).unwrap();
        assert_eq!(addresses.len(), 3);
        for (offset, address) in addresses.iter().enumerate() {
            let single = kd
                .derive_address(TEST_MNEMONIC, &prefix.child(2 + offset as u32).unwrap())
                .unwrap();
            assert_eq!(*address, single);
        }
    }

    #[test]
    fn test_range_bounds() {
        let kd = KeyDerivation::new();
        let prefix = path("m/44'/60'/0'/0");
        assert!(kd.derive_range(TEST_MNEMONIC, &prefix, 0, 0).is_err());
        assert!(kd.derive_range(TEST_MNEMONIC, &prefix, 0, 101).is_err());
        assert!(matches!(
            kd.derive_range(TEST_MNEMONIC, &prefix, HARDENED_OFFSET - 1, 2),
            Err(EngineError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_solana_requires_hardened_path() {
        let kd = KeyDerivation::new();
        let address = kd
            .derive_chain_address(TEST_MNEMONIC, &path("m/44'/501'/0'/0'"), AddressEncoding::Solana)
            .unwrap();
        let decoded = bs58::decode(&address).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);

        let err = kd
            .derive_chain_address(TEST_MNEMONIC, &path("m/44'/501'/0'/0"), AddressEncoding::Solana)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPath(_)));
    }

    #[test]
    fn test_passphrase_changes_wallet() {
        let p = path("m/44'/60'/0'/0/0");
        let plain = KeyDerivation::new().derive_address(TEST_MNEMONIC, &p).unwrap();
        let protected = KeyDerivation::with_passphrase("TREZOR")
            .derive_address(TEST_MNEMONIC, &p)
            .unwrap();
        assert_ne!(plain, protected);
    }

    #[test]
    fn test_invalid_mnemonic() {
        let kd = KeyDerivation::new();
        let p = path("m/44'/60'/0'/0/0");
        // 校验和错误
        let bad_checksum = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(
            kd.derive_address(bad_checksum, &p),
            Err(EngineError::InvalidMnemonic(_))
        ));
        // 词表外单词
        assert!(matches!(
            kd.derive_address("hello world", &p),
            Err(EngineError::InvalidMnemonic(_))
        ));
    }
}
