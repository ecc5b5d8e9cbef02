//! 交易与消息签名
//!
//! 纯 CPU 计算，不做任何网络调用；密钥只在调用期间借用，从不保存。

use ethers::types::{
    transaction::eip712::{Eip712, TypedData},
    Signature, H256,
};
use ethers::utils::{hash_message, keccak256};

use crate::{
    domain::{
        derivation::SigningKey,
        transaction::{SignedTx, UnsignedTx},
    },
    error::{EngineError, Result},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSigner;

impl TransactionSigner {
    pub fn new() -> Self {
        Self
    }

    /// 签名交易（EIP-155 传统交易或 EIP-1559 交易），返回 RLP 原始字节与交易哈希
    pub fn sign(&self, unsigned: &UnsignedTx, key: &SigningKey) -> Result<SignedTx> {
        let signer_address = key.address();
        if signer_address != unsigned.from {
            return Err(EngineError::SignerMismatch {
                expected: format!("{:?}", unsigned.from),
                actual: format!("{:?}", signer_address),
            });
        }
        let nonce = unsigned.nonce().ok_or_else(|| {
            EngineError::InsufficientParameters("transaction has no nonce".into())
        })?;

        let wallet = key.wallet(unsigned.chain_id);
        let signature = wallet
            .sign_transaction_sync(&unsigned.tx)
            .map_err(|e| EngineError::Signing(e.to_string()))?;

        let raw = unsigned.tx.rlp_signed(&signature);
        let tx_hash = H256::from(keccak256(&raw));

        tracing::debug!(
            network = %unsigned.network_id,
            tx_hash = ?tx_hash,
            nonce = %nonce,
            "Transaction signed"
        );

        Ok(SignedTx {
            network_id: unsigned.network_id.clone(),
            from: unsigned.from,
            nonce,
            raw,
            tx_hash,
        })
    }

    /// EIP-191 personal_sign
    pub fn sign_personal_message(&self, message: &[u8], key: &SigningKey) -> Result<Signature> {
        self.sign_digest(hash_message(message), key)
    }

    /// EIP-712 结构化数据签名
    pub fn sign_structured_data(&self, typed_data: &TypedData, key: &SigningKey) -> Result<Signature> {
        let digest = typed_data
            .encode_eip712()
            .map_err(|e| EngineError::InvalidRequest(format!("invalid typed data: {}", e)))?;
        self.sign_digest(H256::from(digest), key)
    }

    fn sign_digest(&self, digest: H256, key: &SigningKey) -> Result<Signature> {
        // 消息签名不绑定链 ID
        key.wallet(1)
            .sign_hash(digest)
            .map_err(|e| EngineError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{
        transaction::eip2718::TypedTransaction, Address, Eip1559TransactionRequest,
        TransactionRequest, U256,
    };

    use super::*;
    use crate::domain::{
        derivation::KeyDerivation, derivation_path::DerivationPath, transaction::TxKind,
    };

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn key(index: u32) -> SigningKey {
        let path = DerivationPath::parse("m/44'/60'/0'/0")
            .unwrap()
            .child(index)
            .unwrap();
        KeyDerivation::new()
            .derive_signing_key(TEST_MNEMONIC, &path)
            .unwrap()
    }

    fn unsigned(from: Address, tx: TypedTransaction) -> UnsignedTx {
        UnsignedTx {
            network_id: "sepolia".into(),
            chain_id: 11155111,
            from,
            kind: TxKind::NativeTransfer,
            amount: U256::from(1u64),
            tx,
        }
    }

    #[test]
    fn test_sign_legacy_recovers_sender() {
        let key = key(0);
        let tx = TransactionRequest::new()
            .from(key.address())
            .to(Address::repeat_byte(0x22))
            .value(1u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .nonce(3u64)
            .chain_id(11155111u64);
        let unsigned = unsigned(key.address(), TypedTransaction::Legacy(tx));

        let signed = TransactionSigner::new().sign(&unsigned, &key).unwrap();
        assert_eq!(signed.nonce, U256::from(3u64));
        assert_eq!(signed.tx_hash, H256::from(keccak256(&signed.raw)));

        let rlp = ethers::utils::rlp::Rlp::new(&signed.raw);
        let (_, signature) = TypedTransaction::decode_signed(&rlp).unwrap();
        assert_eq!(
            signature.recover(unsigned.tx.sighash()).unwrap(),
            key.address()
        );
        // EIP-155：v 中编码了链 ID
        assert!(signature.v >= 11155111 * 2 + 35);
    }

    #[test]
    fn test_sign_eip1559_is_typed_envelope() {
        let key = key(0);
        let tx = Eip1559TransactionRequest::new()
            .from(key.address())
            .to(Address::repeat_byte(0x22))
            .value(1u64)
            .gas(21_000u64)
            .max_priority_fee_per_gas(1_000_000_000u64)
            .max_fee_per_gas(50_000_000_000u64)
            .nonce(0u64)
            .chain_id(11155111u64);
        let unsigned = unsigned(key.address(), TypedTransaction::Eip1559(tx));

        let signed = TransactionSigner::new().sign(&unsigned, &key).unwrap();
        // EIP-2718 类型前缀
        assert_eq!(signed.raw[0], 0x02);
    }

    #[test]
    fn test_signer_mismatch() {
        let tx = TransactionRequest::new().nonce(0u64).chain_id(1u64);
        let unsigned = unsigned(key(1).address(), TypedTransaction::Legacy(tx));
        let err = TransactionSigner::new().sign(&unsigned, &key(0)).unwrap_err();
        assert!(matches!(err, EngineError::SignerMismatch { .. }));
    }

    #[test]
    fn test_personal_message_recovers() {
        let key = key(0);
        let signature = TransactionSigner::new()
            .sign_personal_message(b"hello ironvault", &key)
            .unwrap();
        assert!(signature.verify("hello ironvault", key.address()).is_ok());
    }

    #[test]
    fn test_structured_data_recovers() {
        let key = key(0);
        let json = serde_json::json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                "Mail": [
                    {"name": "from", "type": "address"},
                    {"name": "contents", "type": "string"}
                ]
            },
            "primaryType": "Mail",
            "domain": {"name": "Ether Mail", "version": "1", "chainId": 1},
            "message": {
                "from": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826",
                "contents": "Hello, Bob!"
            }
        });
        let typed: TypedData = serde_json::from_value(json).unwrap();
        let signature = TransactionSigner::new()
            .sign_structured_data(&typed, &key)
            .unwrap();
        let digest = H256::from(typed.encode_eip712().unwrap());
        assert_eq!(signature.recover(digest).unwrap(), key.address());
    }
}
