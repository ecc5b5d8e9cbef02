//! 测试辅助模块
//! 内存链客户端与测试用的服务装配，测试不需要任何网络访问

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use ironvault::{
    config::{Config, CryptoConfig, LoggingConfig, RpcConfig, SessionConfig},
    domain::chain_config::NetworkConfig,
    infrastructure::rpc_client::{ChainClient, ClientError, ClientResult, NonceTag},
    service::network_registry::NetworkRegistry,
    AppState,
};

/// BIP39 标准测试助记词
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// TEST_MNEMONIC 在 m/44'/60'/0'/0/0 的地址
pub const TEST_ADDRESS: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

pub const GWEI: u64 = 1_000_000_000;

/// 广播时的模拟结果
#[derive(Debug, Clone)]
pub enum BroadcastBehavior {
    Accept,
    Reject(String),
    Drop(String),
    /// 连接未建立，请求没有发出
    Unreachable,
}

#[derive(Debug)]
struct MockState {
    online: bool,
    block_number: u64,
    balances: HashMap<Address, U256>,
    latest_nonces: HashMap<Address, U256>,
    pending_nonces: HashMap<Address, U256>,
    gas_price: U256,
    base_fee: Option<U256>,
    priority_fee: Option<U256>,
    broadcast: BroadcastBehavior,
    sent: Vec<Bytes>,
}

/// 内存链客户端
#[derive(Debug, Clone)]
pub struct MockChainClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                online: true,
                block_number: 19_000_000,
                balances: HashMap::new(),
                latest_nonces: HashMap::new(),
                pending_nonces: HashMap::new(),
                gas_price: U256::from(20 * GWEI),
                base_fee: Some(U256::from(10 * GWEI)),
                priority_fee: Some(U256::from(GWEI)),
                broadcast: BroadcastBehavior::Accept,
                sent: Vec::new(),
            })),
        }
    }

    /// 不支持 EIP-1559 的链
    pub fn legacy() -> Self {
        let client = Self::new();
        client.set_base_fee(None);
        client
    }

    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(address, balance);
    }

    pub fn set_nonces(&self, address: Address, latest: u64, pending: u64) {
        let mut state = self.state.lock().unwrap();
        state.latest_nonces.insert(address, U256::from(latest));
        state.pending_nonces.insert(address, U256::from(pending));
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    pub fn set_base_fee(&self, base_fee: Option<U256>) {
        self.state.lock().unwrap().base_fee = base_fee;
    }

    /// None 表示节点不支持 eth_maxPriorityFeePerGas
    pub fn set_priority_fee(&self, tip: Option<U256>) {
        self.state.lock().unwrap().priority_fee = tip;
    }

    pub fn set_broadcast(&self, behavior: BroadcastBehavior) {
        self.state.lock().unwrap().broadcast = behavior;
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    fn check_online(state: &MockState) -> ClientResult<()> {
        if state.online {
            Ok(())
        } else {
            Err(ClientError::Unreachable("connection refused".into()))
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> ClientResult<u64> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.block_number)
    }

    async fn balance(&self, address: Address) -> ClientResult<U256> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address, tag: NonceTag) -> ClientResult<U256> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        let nonces = match tag {
            NonceTag::Latest => &state.latest_nonces,
            NonceTag::Pending => &state.pending_nonces,
        };
        Ok(nonces.get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> ClientResult<U256> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.gas_price)
    }

    async fn base_fee(&self) -> ClientResult<Option<U256>> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.base_fee)
    }

    async fn max_priority_fee(&self) -> ClientResult<U256> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        state.priority_fee.ok_or(ClientError::Rejected {
            code: -32601,
            message: "the method eth_maxPriorityFeePerGas does not exist".into(),
        })
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        let mut state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        match state.broadcast.clone() {
            BroadcastBehavior::Accept => {
                let hash = H256::from(keccak256(&raw));
                state.sent.push(raw);
                Ok(hash)
            }
            BroadcastBehavior::Reject(message) => Err(ClientError::Rejected {
                code: -32000,
                message,
            }),
            BroadcastBehavior::Drop(message) => {
                // 节点可能已经收到
                state.sent.push(raw);
                Err(ClientError::Transport(message))
            }
            BroadcastBehavior::Unreachable => {
                Err(ClientError::Unreachable("connection refused".into()))
            }
        }
    }
}

pub fn network(id: &str, chain_id: u64, supports_eip1559: bool) -> NetworkConfig {
    NetworkConfig::new(
        id,
        id,
        chain_id,
        "ETH",
        18,
        format!("http://{}.invalid", id),
        true,
        supports_eip1559,
        2 * GWEI,
    )
}

/// 两条测试链：sepolia（EIP-1559）与 legacy（仅传统交易）
pub struct TestNetworks {
    pub registry: Arc<NetworkRegistry>,
    pub sepolia: MockChainClient,
    pub legacy: MockChainClient,
}

pub fn test_networks() -> TestNetworks {
    let sepolia = MockChainClient::new();
    let legacy = MockChainClient::legacy();
    let registry = NetworkRegistry::with_clients(
        vec![
            (
                network("sepolia", 11155111, true),
                Arc::new(sepolia.clone()) as Arc<dyn ChainClient>,
            ),
            (
                network("legacy", 1337, false),
                Arc::new(legacy.clone()) as Arc<dyn ChainClient>,
            ),
        ],
        "sepolia",
    )
    .expect("registry");
    TestNetworks {
        registry: Arc::new(registry),
        sepolia,
        legacy,
    }
}

pub fn test_config() -> Config {
    Config {
        crypto: CryptoConfig {
            master_secret: Some("integration_test_master_secret".into()),
        },
        session: SessionConfig {
            default_ttl_secs: 900,
            max_ttl_secs: 3600,
            sweep_interval_secs: 1,
        },
        rpc: RpcConfig {
            request_timeout_secs: 1,
            connect_timeout_secs: 1,
            refresh_interval_secs: 1,
        },
        logging: LoggingConfig {
            level: "debug".into(),
            format: "text".into(),
        },
        networks: Vec::new(),
        default_network: "sepolia".into(),
    }
}

/// 基于内存链的完整应用状态
pub fn test_app_state() -> (AppState, TestNetworks) {
    let networks = test_networks();
    let state = AppState::with_registry(&test_config(), Arc::clone(&networks.registry))
        .expect("app state");
    (state, networks)
}

pub fn test_address() -> Address {
    TEST_ADDRESS.parse().expect("address")
}
