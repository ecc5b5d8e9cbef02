//! 线上请求/响应类型
//!
//! 所有数值一律以十进制字符串传输（不使用浮点），地址为 0x 十六进制。
//! 请求类型只做格式转换，业务校验由服务层完成。

use std::{collections::BTreeMap, fmt, time::Duration};

use ethers::types::{transaction::eip712::TypedData, Address, Signature, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{derivation_path::DerivationPath, transaction::{GasSuggestion, TxOptions}},
    error::{EngineError, ErrorBody, Result},
    service::{
        network_registry::CrossChainBalance,
        session_vault::OpenedSession,
        wallet_service::{Credential, SubmittedTx, TxOrigin},
    },
    utils::{
        address_validator::AddressValidator,
        amount::{format_amount, parse_amount, parse_optional, parse_optional_int},
    },
};

pub use crate::infrastructure::encryption::EncryptedBlob;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 凭据
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `session_id` 与 `mnemonic` 二选一
#[derive(Clone, Default, Deserialize)]
pub struct CredentialFields {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mnemonic: Option<String>,
}

impl fmt::Debug for CredentialFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFields")
            .field("session_id", &self.session_id.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialFields {
    pub fn into_credential(self) -> Result<Credential> {
        match (self.session_id, self.mnemonic) {
            (Some(id), None) => Ok(Credential::Session(id)),
            (None, Some(phrase)) => Ok(Credential::mnemonic(phrase)),
            (Some(_), Some(_)) => Err(EngineError::InvalidRequest(
                "provide either session_id or mnemonic, not both".into(),
            )),
            (None, None) => Err(EngineError::InvalidRequest(
                "session_id or mnemonic is required".into(),
            )),
        }
    }
}

fn parse_path(path: Option<&str>) -> Result<Option<DerivationPath>> {
    path.map(DerivationPath::parse).transpose()
}

fn origin(
    credential: CredentialFields,
    network_id: Option<String>,
    derivation_path: Option<&str>,
) -> Result<TxOrigin> {
    Ok(TxOrigin {
        credential: credential.into_credential()?,
        network_id,
        derivation_path: parse_path(derivation_path)?,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 会话
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Deserialize)]
pub struct OpenSessionRequest {
    pub mnemonic: String,
    /// 十进制字符串
    #[serde(default)]
    pub ttl_seconds: Option<String>,
}

impl fmt::Debug for OpenSessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSessionRequest")
            .field("mnemonic", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl OpenSessionRequest {
    pub fn ttl(&self) -> Result<Option<Duration>> {
        Ok(parse_optional_int::<u64>(self.ttl_seconds.as_deref(), "ttl_seconds")?
            .map(Duration::from_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenSessionResponse {
    pub session_id: String,
    /// unix 秒，十进制字符串
    pub expire_at: String,
}

impl From<OpenedSession> for OpenSessionResponse {
    fn from(opened: OpenedSession) -> Self {
        Self {
            session_id: opened.session_id,
            expire_at: opened.expires_at.timestamp().to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 地址派生
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct DeriveAddressesRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
}

impl DeriveAddressesRequest {
    pub fn into_parts(self) -> Result<(Credential, Option<DerivationPath>, Option<u32>, Option<u32>)> {
        Ok((
            self.credential.into_credential()?,
            parse_path(self.path_prefix.as_deref())?,
            parse_optional_int(self.start.as_deref(), "start")?,
            parse_optional_int(self.count.as_deref(), "count")?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeriveAddressesResponse {
    pub addresses: Vec<String>,
}

impl From<Vec<Address>> for DeriveAddressesResponse {
    fn from(addresses: Vec<Address>) -> Self {
        Self {
            addresses: addresses.iter().map(|a| to_checksum(a, None)).collect(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 交易
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 可选的费用控制字段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeFields {
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
    #[serde(default)]
    pub gas_limit: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl FeeFields {
    pub fn into_options(self) -> Result<TxOptions> {
        TxOptions::from_parts(
            parse_optional(self.gas_price.as_deref(), "gas_price")?,
            parse_optional(self.max_priority_fee_per_gas.as_deref(), "max_priority_fee_per_gas")?,
            parse_optional(self.max_fee_per_gas.as_deref(), "max_fee_per_gas")?,
            parse_optional(self.gas_limit.as_deref(), "gas_limit")?,
            parse_optional(self.nonce.as_deref(), "nonce")?,
        )
    }
}

/// 原生币转账
#[derive(Debug, Clone, Deserialize)]
pub struct SendTransferRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    pub to: String,
    /// 最小单位
    pub value: String,
    #[serde(flatten)]
    pub fee: FeeFields,
}

/// 解析后的转账命令
#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub origin: TxOrigin,
    pub to: Address,
    pub amount: U256,
    pub options: TxOptions,
}

impl SendTransferRequest {
    pub fn into_command(self) -> Result<TransferCommand> {
        Ok(TransferCommand {
            to: AddressValidator::parse_evm(&self.to)?,
            amount: parse_amount(&self.value)?,
            options: self.fee.into_options()?,
            origin: origin(
                self.credential,
                self.network_id,
                self.derivation_path.as_deref(),
            )?,
        })
    }
}

/// ERC-20 操作（transfer 的 `counterparty` 是收款方，approve 的是被授权方）
#[derive(Debug, Clone)]
pub struct TokenCommand {
    pub origin: TxOrigin,
    pub token: Address,
    pub counterparty: Address,
    pub amount: U256,
    pub options: TxOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendTokenTransferRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    pub token: String,
    pub to: String,
    pub value: String,
    #[serde(flatten)]
    pub fee: FeeFields,
}

impl SendTokenTransferRequest {
    pub fn into_command(self) -> Result<TokenCommand> {
        Ok(TokenCommand {
            token: AddressValidator::parse_evm(&self.token)?,
            counterparty: AddressValidator::parse_evm(&self.to)?,
            amount: parse_amount(&self.value)?,
            options: self.fee.into_options()?,
            origin: origin(
                self.credential,
                self.network_id,
                self.derivation_path.as_deref(),
            )?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    pub token: String,
    pub spender: String,
    pub value: String,
    #[serde(flatten)]
    pub fee: FeeFields,
}

impl ApproveRequest {
    pub fn into_command(self) -> Result<TokenCommand> {
        Ok(TokenCommand {
            token: AddressValidator::parse_evm(&self.token)?,
            counterparty: AddressValidator::parse_evm(&self.spender)?,
            amount: parse_amount(&self.value)?,
            options: self.fee.into_options()?,
            origin: origin(
                self.credential,
                self.network_id,
                self.derivation_path.as_deref(),
            )?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHashResponse {
    pub tx_hash: String,
    pub network_id: String,
    pub nonce: String,
}

impl From<SubmittedTx> for TxHashResponse {
    fn from(tx: SubmittedTx) -> Self {
        Self {
            tx_hash: format!("{:?}", tx.tx_hash),
            network_id: tx.network_id,
            nonce: format_amount(tx.nonce),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 消息签名
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct SignMessageRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub derivation_path: Option<String>,
    /// UTF-8 文本
    pub message: String,
}

impl SignMessageRequest {
    pub fn into_parts(self) -> Result<(TxOrigin, String)> {
        let origin = origin(self.credential, None, self.derivation_path.as_deref())?;
        Ok((origin, self.message))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignTypedDataRequest {
    #[serde(flatten)]
    pub credential: CredentialFields,
    #[serde(default)]
    pub derivation_path: Option<String>,
    pub typed_data: TypedData,
}

impl SignTypedDataRequest {
    pub fn into_parts(self) -> Result<(TxOrigin, TypedData)> {
        let origin = origin(self.credential, None, self.derivation_path.as_deref())?;
        Ok((origin, self.typed_data))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureResponse {
    /// 0x + r || s || v（65 字节）
    pub signature: String,
}

impl From<Signature> for SignatureResponse {
    fn from(signature: Signature) -> Self {
        Self {
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 查询
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// EIP-1559 字段在仅支持传统交易的网络上为 null
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasSuggestionResponse {
    pub chain_id: String,
    pub base_fee: Option<String>,
    pub tip_cap: Option<String>,
    pub max_fee: Option<String>,
    pub gas_price: String,
}

impl From<GasSuggestion> for GasSuggestionResponse {
    fn from(s: GasSuggestion) -> Self {
        Self {
            chain_id: s.chain_id.to_string(),
            base_fee: s.fee_market.map(|fm| format_amount(fm.base_fee)),
            tip_cap: s.fee_market.map(|fm| format_amount(fm.tip_cap)),
            max_fee: s.fee_market.map(|fm| format_amount(fm.max_fee)),
            gas_price: format_amount(s.gas_price),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossChainBalanceRequest {
    pub address: String,
    /// 为空表示全部网络
    #[serde(default)]
    pub networks: Vec<String>,
}

impl CrossChainBalanceRequest {
    pub fn into_parts(self) -> Result<(Address, Vec<String>)> {
        Ok((AddressValidator::parse_evm(&self.address)?, self.networks))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CrossChainBalanceResponse {
    pub balances: BTreeMap<String, String>,
    pub errors: BTreeMap<String, ErrorBody>,
}

impl From<&CrossChainBalance> for CrossChainBalanceResponse {
    fn from(result: &CrossChainBalance) -> Self {
        Self {
            balances: result
                .balances
                .iter()
                .map(|(id, amount)| (id.clone(), format_amount(*amount)))
                .collect(),
            errors: result
                .errors
                .iter()
                .map(|(id, err)| (id.clone(), ErrorBody::from(err)))
                .collect(),
        }
    }
}
