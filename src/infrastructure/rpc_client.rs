//! 链客户端
//!
//! `ChainClient` 是引擎与节点之间唯一的接缝，测试中由内存实现替代。
//! 客户端本身不做重试；超时由底层 reqwest 客户端设置。

use std::{error::Error as StdError, io::ErrorKind as IoErrorKind, time::Duration};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Address, BlockNumber, Bytes, H256, U256};

use crate::config::RpcConfig;
use crate::error::{EngineError, Result};

/// nonce 查询的区块标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonceTag {
    /// 已确认
    Latest,
    /// 含内存池中的未确认交易
    Pending,
}

impl From<NonceTag> for BlockNumber {
    fn from(tag: NonceTag) -> Self {
        match tag {
            NonceTag::Latest => BlockNumber::Latest,
            NonceTag::Pending => BlockNumber::Pending,
        }
    }
}

/// 客户端错误
///
/// - `Rejected`：节点给出了 JSON-RPC 错误响应
/// - `Unreachable`：连接未建立，请求没有发出
/// - `Transport`：其余传输错误，对广播而言意味着结果未知
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("node returned error {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        if let Some(resp) = err.as_error_response() {
            return ClientError::Rejected {
                code: resp.code,
                message: resp.message.clone(),
            };
        }
        if is_connect_error(&err) {
            ClientError::Unreachable(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// 沿 source 链查找建立连接阶段的失败
fn is_connect_error(err: &ProviderError) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = match err {
        ProviderError::HTTPError(e) => return e.is_connect(),
        // Http 传输错误对 reqwest 透明，source 链从 hyper 开始
        ProviderError::JsonRpcClientError(inner) => inner.source(),
        other => other.source(),
    };
    while let Some(e) = source {
        if e
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_connect)
        {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                IoErrorKind::ConnectionRefused
                    | IoErrorKind::AddrNotAvailable
                    | IoErrorKind::NotConnected
            ) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> ClientResult<u64>;

    async fn balance(&self, address: Address) -> ClientResult<U256>;

    async fn transaction_count(&self, address: Address, tag: NonceTag) -> ClientResult<U256>;

    /// eth_gasPrice
    async fn gas_price(&self) -> ClientResult<U256>;

    /// 最新区块的 baseFeePerGas，London 之前的链返回 None
    async fn base_fee(&self) -> ClientResult<Option<U256>>;

    /// eth_maxPriorityFeePerGas
    async fn max_priority_fee(&self) -> ClientResult<U256>;

    /// eth_sendRawTransaction
    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256>;
}

/// 基于 ethers `Provider<Http>` 的 EVM 客户端
#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    provider: Provider<Http>,
}

impl EvmRpcClient {
    pub fn new(rpc_url: &str, config: &RpcConfig) -> Result<Self> {
        Self::with_timeouts(rpc_url, config.request_timeout(), config.connect_timeout())
    }

    pub fn with_timeouts(
        rpc_url: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let url = reqwest::Url::parse(rpc_url).map_err(|e| {
            EngineError::Configuration(format!("invalid rpc url {}: {}", rpc_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| EngineError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            provider: Provider::new(Http::new_with_client(url, client)),
        })
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    async fn block_number(&self) -> ClientResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn balance(&self, address: Address) -> ClientResult<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn transaction_count(&self, address: Address, tag: NonceTag) -> ClientResult<U256> {
        let block = BlockNumber::from(tag);
        Ok(self
            .provider
            .get_transaction_count(address, Some(block.into()))
            .await?)
    }

    async fn gas_price(&self) -> ClientResult<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn base_fee(&self) -> ClientResult<Option<U256>> {
        let block = self.provider.get_block(BlockNumber::Latest).await?;
        Ok(block.and_then(|b| b.base_fee_per_gas))
    }

    async fn max_priority_fee(&self) -> ClientResult<U256> {
        Ok(self
            .provider
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }
}
