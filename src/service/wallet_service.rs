//! 钱包编排服务
//!
//! 串起一次完整请求：解析凭据 → 派生密钥 → 构建 → 签名 → 广播。
//! 网络 ID 在每次调用开始时确定一次（显式传入或取当前活动网络），
//! 之后整条流程都使用这个值。

use std::{fmt, sync::Arc, time::Duration};

use ethers::types::{
    transaction::eip712::TypedData, Address, Signature, H256, U256,
};
use zeroize::Zeroizing;

use crate::{
    domain::{
        derivation::{KeyDerivation, SigningKey},
        derivation_path::DerivationPath,
        transaction::{GasSuggestion, TxOptions, UnsignedTx},
    },
    error::{EngineError, Result},
    infrastructure::log_redact::short_address,
    service::{
        gas_oracle::GasOracle,
        network_registry::{CrossChainBalance, NetworkRegistry},
        session_vault::{OpenedSession, SessionVault},
        transaction_builder::TransactionBuilder,
        transaction_signer::TransactionSigner,
    },
};

/// 默认地址派生前缀
pub const DEFAULT_ADDRESS_PREFIX: &str = "m/44'/60'/0'/0";
/// 未指定数量时派生的地址数
pub const DEFAULT_ADDRESS_COUNT: u32 = 1;

/// 调用方出示的凭据
#[derive(Clone)]
pub enum Credential {
    /// 已托管的会话 ID
    Session(String),
    /// 直接携带助记词（不托管）
    Mnemonic(Zeroizing<String>),
}

impl Credential {
    pub fn session(session_id: impl Into<String>) -> Self {
        Credential::Session(session_id.into())
    }

    pub fn mnemonic(phrase: impl Into<String>) -> Self {
        Credential::Mnemonic(Zeroizing::new(phrase.into()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Session(_) => f.write_str("Credential::Session(<redacted>)"),
            Credential::Mnemonic(_) => f.write_str("Credential::Mnemonic(<redacted>)"),
        }
    }
}

/// 交易发起方：凭据 + 可选网络 + 可选派生路径
#[derive(Debug, Clone)]
pub struct TxOrigin {
    pub credential: Credential,
    pub network_id: Option<String>,
    pub derivation_path: Option<DerivationPath>,
}

impl TxOrigin {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            network_id: None,
            derivation_path: None,
        }
    }

    pub fn on_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn with_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

/// 广播成功后的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub network_id: String,
    pub from: Address,
    pub nonce: U256,
    pub tx_hash: H256,
}

pub struct WalletService {
    sessions: Arc<SessionVault>,
    registry: Arc<NetworkRegistry>,
    gas_oracle: Arc<GasOracle>,
    builder: Arc<TransactionBuilder>,
    signer: TransactionSigner,
    derivation: KeyDerivation,
}

impl WalletService {
    pub fn new(
        sessions: Arc<SessionVault>,
        registry: Arc<NetworkRegistry>,
        gas_oracle: Arc<GasOracle>,
        builder: Arc<TransactionBuilder>,
        signer: TransactionSigner,
    ) -> Self {
        Self {
            sessions,
            registry,
            gas_oracle,
            builder,
            signer,
            derivation: KeyDerivation::new(),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 会话
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn open_session(
        &self,
        mnemonic: &str,
        ttl: Option<Duration>,
    ) -> Result<OpenedSession> {
        self.sessions.open(mnemonic, ttl).await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        self.sessions.close(session_id).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 地址派生
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 派生 `prefix/start .. prefix/start+count-1`
    pub async fn derive_addresses(
        &self,
        credential: &Credential,
        path_prefix: Option<&DerivationPath>,
        start: Option<u32>,
        count: Option<u32>,
    ) -> Result<Vec<Address>> {
        let (mnemonic, _) = self.unlock(credential).await?;
        let default_prefix;
        let prefix = match path_prefix {
            Some(prefix) => prefix,
            None => {
                default_prefix = DerivationPath::parse(DEFAULT_ADDRESS_PREFIX)?;
                &default_prefix
            }
        };
        self.derivation.derive_range(
            &mnemonic,
            prefix,
            start.unwrap_or(0),
            count.unwrap_or(DEFAULT_ADDRESS_COUNT),
        )
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 交易
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn send_native_transfer(
        &self,
        origin: &TxOrigin,
        to: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<SubmittedTx> {
        let network_id = self.resolve_network(origin).await?;
        let key = self.signing_key(origin).await?;
        let unsigned = self
            .builder
            .build_native_transfer(&network_id, key.address(), to, amount, opts)
            .await?;
        self.sign_and_broadcast(unsigned, &key, opts.nonce.is_some())
            .await
    }

    pub async fn send_token_transfer(
        &self,
        origin: &TxOrigin,
        token: Address,
        to: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<SubmittedTx> {
        let network_id = self.resolve_network(origin).await?;
        let key = self.signing_key(origin).await?;
        let unsigned = self
            .builder
            .build_token_transfer(&network_id, key.address(), token, to, amount, opts)
            .await?;
        self.sign_and_broadcast(unsigned, &key, opts.nonce.is_some())
            .await
    }

    pub async fn send_approve(
        &self,
        origin: &TxOrigin,
        token: Address,
        spender: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<SubmittedTx> {
        let network_id = self.resolve_network(origin).await?;
        let key = self.signing_key(origin).await?;
        let unsigned = self
            .builder
            .build_approve(&network_id, key.address(), token, spender, amount, opts)
            .await?;
        self.sign_and_broadcast(unsigned, &key, opts.nonce.is_some())
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 消息签名（不访问网络）
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn sign_message(&self, origin: &TxOrigin, message: &[u8]) -> Result<Signature> {
        let key = self.signing_key(origin).await?;
        self.signer.sign_personal_message(message, &key)
    }

    pub async fn sign_typed_data(
        &self,
        origin: &TxOrigin,
        typed_data: &TypedData,
    ) -> Result<Signature> {
        let key = self.signing_key(origin).await?;
        self.signer.sign_structured_data(typed_data, &key)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 查询
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn gas_suggestion(&self, network_id: Option<&str>) -> Result<GasSuggestion> {
        let network_id = match network_id {
            Some(id) => id.to_string(),
            None => self.registry.active_id().await,
        };
        self.gas_oracle.suggest(&network_id).await
    }

    pub async fn cross_chain_balance(
        &self,
        address: Address,
        network_ids: &[String],
    ) -> CrossChainBalance {
        self.registry.cross_chain_balance(address, network_ids).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 内部
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn resolve_network(&self, origin: &TxOrigin) -> Result<String> {
        let network_id = match &origin.network_id {
            Some(id) => id.clone(),
            None => self.registry.active_id().await,
        };
        // 未知网络在解锁凭据之前就失败
        self.registry.get(&network_id).await?;
        Ok(network_id)
    }

    /// 取出助记词与会话默认路径（直接携带助记词时为 None）
    async fn unlock(
        &self,
        credential: &Credential,
    ) -> Result<(Zeroizing<String>, Option<DerivationPath>)> {
        match credential {
            Credential::Session(session_id) => {
                let credentials = self.sessions.read(session_id).await?;
                Ok((credentials.mnemonic, Some(credentials.default_path)))
            }
            Credential::Mnemonic(phrase) => {
                KeyDerivation::validate_mnemonic(phrase)?;
                Ok((phrase.clone(), None))
            }
        }
    }

    async fn signing_key(&self, origin: &TxOrigin) -> Result<SigningKey> {
        let (mnemonic, session_path) = self.unlock(&origin.credential).await?;
        let path = match (&origin.derivation_path, session_path) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => path,
            (None, None) => DerivationPath::default_evm(),
        };
        self.derivation.derive_signing_key(&mnemonic, &path)
    }

    async fn sign_and_broadcast(
        &self,
        unsigned: UnsignedTx,
        key: &SigningKey,
        explicit_nonce: bool,
    ) -> Result<SubmittedTx> {
        let nonces = self.builder.nonce_tracker();
        let nonce = unsigned.nonce().ok_or_else(|| {
            EngineError::InsufficientParameters("transaction has no nonce".into())
        })?;

        let signed = match self.signer.sign(&unsigned, key) {
            Ok(signed) => signed,
            Err(e) => {
                if !explicit_nonce {
                    nonces.release(&unsigned.network_id, unsigned.from, nonce).await;
                }
                return Err(e);
            }
        };

        match self.registry.broadcast_signed(&signed).await {
            Ok(tx_hash) => Ok(SubmittedTx {
                network_id: signed.network_id,
                from: signed.from,
                nonce: signed.nonce,
                tx_hash,
            }),
            Err(e) => {
                // 只有"肯定未提交"才归还 nonce；结果未知时保留预留
                let definitely_not_sent = matches!(
                    e,
                    EngineError::BroadcastRejected { .. } | EngineError::NetworkUnavailable(_)
                );
                if definitely_not_sent && !explicit_nonce {
                    nonces.release(&signed.network_id, signed.from, signed.nonce).await;
                }
                tracing::warn!(
                    network = %signed.network_id,
                    from = %short_address(&signed.from),
                    nonce = %signed.nonce,
                    code = e.code(),
                    nonce_released = definitely_not_sent && !explicit_nonce,
                    "Transaction submission failed"
                );
                Err(e)
            }
        }
    }
}
