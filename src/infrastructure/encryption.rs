//! AES-256-GCM 加密/解密模块
//!
//! - 密码模式：每次加密生成随机盐，scrypt 派生 32 字节密钥
//! - 默认模式：启动时由主密钥（WALLET_ENC_KEY）派生一次的固定密钥
//!
//! 每次加密都生成新的随机 nonce。解密失败一律返回 AuthenticationFailed，
//! KDF 失败一律返回错误，不降级到任何更弱的哈希。

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// 主密钥拉伸使用的固定域盐
const MASTER_KEY_DOMAIN: &[u8] = b"ironvault/master-key/v1";

/// scrypt 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// N = 2^log_n
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    /// N=2^15, r=8, p=1
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(secret, salt, &params, &mut key[..])
            .map_err(|e| EngineError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

/// 加密数据块（自包含，解密只需数据块与正确的密码/默认密钥）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// base64 密文（含 GCM tag）
    pub data: String,
    /// hex 盐；默认密钥模式下为空字符串
    pub salt: String,
    /// hex nonce
    pub nonce: String,
}

impl EncryptedBlob {
    pub fn is_password_protected(&self) -> bool {
        !self.salt.is_empty()
    }
}

/// 加密保险库
#[derive(Clone)]
pub struct CryptoVault {
    default_key: Zeroizing<[u8; KEY_LEN]>,
    kdf: KdfParams,
}

impl fmt::Debug for CryptoVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoVault")
            .field("kdf", &self.kdf)
            .field("default_key", &"<redacted>")
            .finish()
    }
}

impl CryptoVault {
    /// 由主密钥构建
    ///
    /// - 64 位 hex：直接作为 32 字节密钥
    /// - 其他长度 >= 16 的字符串：scrypt 拉伸
    /// - 更短或为空：Configuration 错误
    pub fn from_master_secret(secret: &str) -> Result<Self> {
        Self::with_kdf_params(secret, KdfParams::default())
    }

    pub fn with_kdf_params(secret: &str, kdf: KdfParams) -> Result<Self> {
        let default_key = Self::master_key(secret, &kdf)?;
        Ok(Self { default_key, kdf })
    }

    fn master_key(secret: &str, kdf: &KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        if secret.len() == KEY_LEN * 2 {
            if let Ok(bytes) = hex::decode(secret) {
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                key.copy_from_slice(&bytes);
                return Ok(key);
            }
        }
        if secret.len() < 16 {
            return Err(EngineError::Configuration(
                "WALLET_ENC_KEY too short (min 16)".into(),
            ));
        }
        kdf.derive(secret.as_bytes(), MASTER_KEY_DOMAIN)
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 密码模式
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn encrypt_with_password(&self, plaintext: &[u8], password: &str) -> Result<EncryptedBlob> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = self.kdf.derive(password.as_bytes(), &salt)?;

        let (nonce, data) = seal(&key, plaintext)?;
        Ok(EncryptedBlob {
            data: BASE64.encode(data),
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
        })
    }

    pub fn decrypt_with_password(
        &self,
        blob: &EncryptedBlob,
        password: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if !blob.is_password_protected() {
            return Err(EngineError::AuthenticationFailed);
        }
        let salt = hex::decode(&blob.salt).map_err(|_| EngineError::AuthenticationFailed)?;
        if salt.len() != SALT_LEN {
            return Err(EngineError::AuthenticationFailed);
        }
        let key = self.kdf.derive(password.as_bytes(), &salt)?;
        open(&key, blob)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 默认密钥模式
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn encrypt_default(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let (nonce, data) = seal(&self.default_key, plaintext)?;
        Ok(EncryptedBlob {
            data: BASE64.encode(data),
            salt: String::new(),
            nonce: hex::encode(nonce),
        })
    }

    pub fn decrypt_default(&self, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>> {
        if blob.is_password_protected() {
            return Err(EngineError::AuthenticationFailed);
        }
        open(&self.default_key, blob)
    }
}

fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| EngineError::Encryption(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| EngineError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    Ok((nonce_bytes, ciphertext))
}

fn open(key: &[u8; KEY_LEN], blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>> {
    let nonce = hex::decode(&blob.nonce).map_err(|_| EngineError::AuthenticationFailed)?;
    if nonce.len() != NONCE_LEN {
        return Err(EngineError::AuthenticationFailed);
    }
    let ciphertext = BASE64
        .decode(&blob.data)
        .map_err(|_| EngineError::AuthenticationFailed)?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| EngineError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| EngineError::AuthenticationFailed)
}
