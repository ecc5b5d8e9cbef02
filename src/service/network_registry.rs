//! 多网络注册表
//!
//! 持有每条链的配置与客户端，记录当前活动网络，并把余额查询、广播
//! 分派给对应的链客户端。
//!
//! 锁只保护配置表本身；发起 RPC 前先克隆出 `Arc<dyn ChainClient>`，
//! 任何锁都不会跨越网络调用。

use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};

use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use futures::future::join_all;
use tokio::{sync::RwLock, task::JoinHandle, time::interval};

use crate::{
    config::RpcConfig,
    domain::{
        chain_config::{ConnectionStatus, NetworkConfig},
        transaction::{GasSuggestion, SignedTx},
    },
    error::{EngineError, Result},
    infrastructure::{
        log_redact::{redact_raw_tx, short_address},
        rpc_client::{ChainClient, ClientError, EvmRpcClient},
    },
};

struct NetworkEntry {
    config: NetworkConfig,
    client: Arc<dyn ChainClient>,
}

struct RegistryState {
    entries: HashMap<String, NetworkEntry>,
    /// 保持配置顺序
    order: Vec<String>,
    active: String,
}

/// 已连接网络的配置快照与客户端
#[derive(Clone)]
pub struct Connection {
    pub config: NetworkConfig,
    pub client: Arc<dyn ChainClient>,
}

/// 跨链余额查询结果：部分成功时逐网络记录错误
#[derive(Debug, Default)]
pub struct CrossChainBalance {
    pub balances: BTreeMap<String, U256>,
    pub errors: BTreeMap<String, EngineError>,
}

impl CrossChainBalance {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct NetworkRegistry {
    state: RwLock<RegistryState>,
}

impl NetworkRegistry {
    /// 按配置为每个网络创建 EVM RPC 客户端
    pub fn from_configs(
        configs: Vec<NetworkConfig>,
        rpc: &RpcConfig,
        default_network: &str,
    ) -> Result<Self> {
        let mut networks = Vec::with_capacity(configs.len());
        for config in configs {
            let client: Arc<dyn ChainClient> = Arc::new(EvmRpcClient::new(&config.rpc_url, rpc)?);
            networks.push((config, client));
        }
        Self::with_clients(networks, default_network)
    }

    /// 使用外部提供的客户端构建
    pub fn with_clients(
        networks: Vec<(NetworkConfig, Arc<dyn ChainClient>)>,
        default_network: &str,
    ) -> Result<Self> {
        if networks.is_empty() {
            return Err(EngineError::Configuration("no networks configured".into()));
        }

        let mut entries = HashMap::with_capacity(networks.len());
        let mut order = Vec::with_capacity(networks.len());
        for (config, client) in networks {
            let id = config.id.clone();
            if entries.contains_key(&id) {
                return Err(EngineError::Configuration(format!(
                    "duplicate network id {}",
                    id
                )));
            }
            order.push(id.clone());
            entries.insert(id, NetworkEntry { config, client });
        }

        if !entries.contains_key(default_network) {
            return Err(EngineError::Configuration(format!(
                "default network {} is not configured",
                default_network
            )));
        }

        Ok(Self {
            state: RwLock::new(RegistryState {
                entries,
                order,
                active: default_network.to_string(),
            }),
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 配置表
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn list_networks(&self) -> Vec<NetworkConfig> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| entry.config.clone())
            .collect()
    }

    pub async fn network_ids(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    pub async fn get(&self, network_id: &str) -> Result<NetworkConfig> {
        self.state
            .read()
            .await
            .entries
            .get(network_id)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))
    }

    /// active 只能被设置为已存在的 id，且条目从不删除
    pub async fn active(&self) -> Result<NetworkConfig> {
        let state = self.state.read().await;
        state
            .entries
            .get(&state.active)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| EngineError::NetworkNotFound(state.active.clone()))
    }

    pub async fn active_id(&self) -> String {
        self.state.read().await.active.clone()
    }

    /// 切换活动网络，不改变任何网络的连接状态
    pub async fn switch_active(&self, network_id: &str) -> Result<NetworkConfig> {
        let mut state = self.state.write().await;
        let config = state
            .entries
            .get(network_id)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
        let previous = std::mem::replace(&mut state.active, network_id.to_string());

        tracing::info!(from = %previous, to = %network_id, "Active network switched");
        Ok(config)
    }

    pub async fn set_status(&self, network_id: &str, status: ConnectionStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(network_id)
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
        if entry.config.status != status {
            tracing::info!(network = %network_id, ?status, "Network status changed");
        }
        entry.config.status = status;
        Ok(())
    }

    pub async fn record_gas_suggestion(
        &self,
        network_id: &str,
        suggestion: GasSuggestion,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(network_id)
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
        entry.config.last_gas = Some(suggestion);
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 客户端分派
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 已连接网络的配置与客户端；断开的网络立即返回 NetworkUnavailable
    pub async fn connection(&self, network_id: &str) -> Result<Connection> {
        let state = self.state.read().await;
        let entry = state
            .entries
            .get(network_id)
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
        if !entry.config.is_connected() {
            return Err(EngineError::NetworkUnavailable(network_id.to_string()));
        }
        Ok(Connection {
            config: entry.config.clone(),
            client: Arc::clone(&entry.client),
        })
    }

    pub async fn client(&self, network_id: &str) -> Result<Arc<dyn ChainClient>> {
        Ok(self.connection(network_id).await?.client)
    }

    pub async fn balance(&self, network_id: &str, address: Address) -> Result<U256> {
        let client = self.client(network_id).await?;
        client
            .balance(address)
            .await
            .map_err(|e| EngineError::rpc(network_id, e))
    }

    /// 并发查询多个网络的余额；`network_ids` 为空时查询全部网络
    pub async fn cross_chain_balance(
        &self,
        address: Address,
        network_ids: &[String],
    ) -> CrossChainBalance {
        let ids = if network_ids.is_empty() {
            self.network_ids().await
        } else {
            network_ids.to_vec()
        };

        let results = join_all(ids.iter().map(|id| async move {
            (id.clone(), self.balance(id, address).await)
        }))
        .await;

        let mut out = CrossChainBalance::default();
        for (id, result) in results {
            match result {
                Ok(balance) => {
                    out.balances.insert(id, balance);
                }
                Err(e) => {
                    tracing::warn!(network = %id, error = %e, "Balance query failed");
                    out.errors.insert(id, e);
                }
            }
        }

        tracing::debug!(
            address = %short_address(&address),
            ok = out.balances.len(),
            failed = out.errors.len(),
            "Cross-chain balance query finished"
        );
        out
    }

    /// 广播原始签名交易
    pub async fn broadcast(&self, network_id: &str, raw: Bytes) -> Result<H256> {
        self.send(network_id, raw, None).await
    }

    /// 广播已签名交易；结果未知时错误中携带 nonce，便于原样重发
    pub async fn broadcast_signed(&self, signed: &SignedTx) -> Result<H256> {
        self.send(&signed.network_id, signed.raw.clone(), Some(signed.nonce))
            .await
    }

    async fn send(&self, network_id: &str, raw: Bytes, nonce: Option<U256>) -> Result<H256> {
        let client = self.client(network_id).await?;
        let local_hash = H256::from(keccak256(&raw));

        tracing::info!(
            network = %network_id,
            tx_hash = ?local_hash,
            raw = %redact_raw_tx(&raw),
            "Broadcasting transaction"
        );

        match client.send_raw_transaction(raw).await {
            Ok(tx_hash) => {
                if tx_hash != local_hash {
                    tracing::warn!(
                        network = %network_id,
                        local = ?local_hash,
                        remote = ?tx_hash,
                        "Node returned unexpected transaction hash"
                    );
                }
                tracing::info!(network = %network_id, tx_hash = ?tx_hash, "Transaction broadcast");
                Ok(tx_hash)
            }
            Err(ClientError::Rejected { code, message }) => {
                tracing::warn!(network = %network_id, code, message = %message, "Broadcast rejected");
                Err(EngineError::BroadcastRejected {
                    network: network_id.to_string(),
                    message,
                })
            }
            Err(ClientError::Unreachable(message)) => {
                tracing::warn!(network = %network_id, message = %message, "Broadcast not sent, node unreachable");
                Err(EngineError::NetworkUnavailable(network_id.to_string()))
            }
            Err(ClientError::Transport(message)) => {
                tracing::error!(
                    network = %network_id,
                    tx_hash = ?local_hash,
                    message = %message,
                    "Broadcast outcome unknown"
                );
                Err(EngineError::BroadcastOutcomeUnknown {
                    network: network_id.to_string(),
                    tx_hash: format!("{:?}", local_hash),
                    nonce: nonce.map(|n| n.to_string()).unwrap_or_else(|| "unknown".into()),
                    message,
                })
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 连接状态刷新
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// 探测区块高度：成功则 Connected 并更新 latest_block，失败则 Disconnected
    pub async fn refresh(&self, network_id: &str) -> Result<ConnectionStatus> {
        let client = {
            let state = self.state.read().await;
            let entry = state
                .entries
                .get(network_id)
                .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
            Arc::clone(&entry.client)
        };

        let probe = client.block_number().await;

        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(network_id)
            .ok_or_else(|| EngineError::NetworkNotFound(network_id.to_string()))?;
        let previous = entry.config.status;

        match probe {
            Ok(block) => {
                entry.config.latest_block = Some(block);
                entry.config.status = ConnectionStatus::Connected;
            }
            Err(e) => {
                entry.config.status = ConnectionStatus::Disconnected;
                tracing::debug!(network = %network_id, error = %e, "Network probe failed");
            }
        }

        if previous != entry.config.status {
            tracing::info!(
                network = %network_id,
                status = ?entry.config.status,
                latest_block = ?entry.config.latest_block,
                "Network status changed"
            );
        }
        Ok(entry.config.status)
    }

    pub async fn refresh_all(&self) -> Vec<(String, ConnectionStatus)> {
        let ids = self.network_ids().await;
        join_all(ids.into_iter().map(|id| async move {
            let status = self
                .refresh(&id)
                .await
                .unwrap_or(ConnectionStatus::Disconnected);
            (id, status)
        }))
        .await
    }

    pub fn spawn_refresher(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                self.refresh_all().await;
            }
        })
    }
}
