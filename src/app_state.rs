use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::Config,
    error::{EngineError, Result},
    infrastructure::encryption::CryptoVault,
    service::{
        gas_oracle::GasOracle, network_registry::NetworkRegistry, nonce_tracker::NonceTracker,
        session_vault::SessionVault, transaction_builder::TransactionBuilder,
        transaction_signer::TransactionSigner, wallet_service::WalletService,
    },
};

/// 应用状态
///
/// 所有服务在这里一次性构造，并显式传给使用方；不存在全局单例，
/// 也不存在"尚未初始化"的运行时状态。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub crypto: Arc<CryptoVault>,
    pub sessions: Arc<SessionVault>,
    pub registry: Arc<NetworkRegistry>,
    pub gas_oracle: Arc<GasOracle>,
    pub nonce_tracker: Arc<NonceTracker>,
    pub builder: Arc<TransactionBuilder>,
    pub signer: TransactionSigner,
    pub wallet: Arc<WalletService>,
}

impl AppState {
    /// 按配置构建：每个网络一个 EVM RPC 客户端
    pub fn new(config: &Config) -> Result<Self> {
        let registry = NetworkRegistry::from_configs(
            config.network_configs(),
            &config.rpc,
            &config.default_network,
        )?;
        Self::with_registry(config, Arc::new(registry))
    }

    /// 注入已构建好的网络注册表
    pub fn with_registry(config: &Config, registry: Arc<NetworkRegistry>) -> Result<Self> {
        let master_secret = config
            .crypto
            .master_secret
            .as_deref()
            .ok_or_else(|| EngineError::Configuration("WALLET_ENC_KEY must be set".into()))?;
        let crypto = Arc::new(CryptoVault::from_master_secret(master_secret)?);

        let sessions = Arc::new(SessionVault::from_config(&config.session));
        let gas_oracle = Arc::new(GasOracle::new(Arc::clone(&registry)));
        let nonce_tracker = Arc::new(NonceTracker::new(Arc::clone(&registry)));
        let builder = Arc::new(TransactionBuilder::new(
            Arc::clone(&registry),
            Arc::clone(&gas_oracle),
            Arc::clone(&nonce_tracker),
        ));
        let signer = TransactionSigner::new();
        let wallet = Arc::new(WalletService::new(
            Arc::clone(&sessions),
            Arc::clone(&registry),
            Arc::clone(&gas_oracle),
            Arc::clone(&builder),
            signer,
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            crypto,
            sessions,
            registry,
            gas_oracle,
            nonce_tracker,
            builder,
            signer,
            wallet,
        })
    }

    /// 启动会话清理与网络状态刷新两个后台任务
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let sweep_every = self.config.session.sweep_interval();
        let refresh_every = self.config.rpc.refresh_interval();

        tracing::info!(
            sweep_interval_secs = sweep_every.as_secs(),
            refresh_interval_secs = refresh_every.as_secs(),
            "Starting background tasks"
        );

        vec![
            Arc::clone(&self.sessions).spawn_sweeper(sweep_every),
            Arc::clone(&self.registry).spawn_refresher(refresh_every),
        ]
    }
}
