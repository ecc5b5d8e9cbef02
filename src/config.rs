//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{domain::chain_config::NetworkConfig, error::EngineError};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 为空时使用内置网络目录
    #[serde(default)]
    pub networks: Vec<NetworkSettings>,
    #[serde(default = "default_network_id")]
    pub default_network: String,
}

/// 加密配置
#[derive(Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// 主密钥（WALLET_ENC_KEY），必填，不存在内置默认值
    #[serde(default, skip_serializing)]
    pub master_secret: Option<String>,
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field(
                "master_secret",
                &self.master_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// 会话托管配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

/// RPC 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub refresh_interval_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 单个网络的配置项（覆盖内置目录）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub native_symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    pub rpc_url: String,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default = "default_true")]
    pub supports_eip1559: bool,
    /// eth_maxPriorityFeePerGas 不可用时的兜底小费（Gwei）
    #[serde(default = "default_priority_fee_gwei")]
    pub default_priority_fee_gwei: u64,
}

fn default_network_id() -> String {
    std::env::var("DEFAULT_NETWORK").unwrap_or_else(|_| "ethereum".into())
}

fn default_decimals() -> u8 {
    18
}

fn default_true() -> bool {
    true
}

fn default_priority_fee_gwei() -> u64 {
    2
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            master_secret: std::env::var("WALLET_ENC_KEY").ok(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: env_u64("SESSION_DEFAULT_TTL_SECS", 900), // 15分钟
            max_ttl_secs: env_u64("SESSION_MAX_TTL_SECS", 86_400),      // 1天
            sweep_interval_secs: env_u64("SESSION_SWEEP_INTERVAL_SECS", 30),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: env_u64("RPC_REQUEST_TIMEOUT_SECS", 15),
            connect_timeout_secs: env_u64("RPC_CONNECT_TIMEOUT_SECS", 5),
            refresh_interval_secs: env_u64("RPC_REFRESH_INTERVAL_SECS", 30),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl SessionConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl NetworkSettings {
    pub fn into_network_config(self) -> NetworkConfig {
        NetworkConfig::new(
            self.id,
            self.name,
            self.chain_id,
            self.native_symbol,
            self.decimals,
            self.rpc_url,
            self.is_testnet,
            self.supports_eip1559,
            self.default_priority_fee_gwei * 1_000_000_000,
        )
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            crypto: CryptoConfig::default(),
            session: SessionConfig::default(),
            rpc: RpcConfig::default(),
            logging: LoggingConfig::default(),
            networks: Vec::new(),
            default_network: default_network_id(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    ///
    /// 主密钥只从环境变量读取时，文件中缺失该字段不会覆盖环境变量
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                let mut file_config = Self::from_file(path)?;
                if file_config.crypto.master_secret.is_none() {
                    file_config.crypto.master_secret = config.crypto.master_secret.take();
                }
                config = file_config;
            }
        }

        Ok(config)
    }

    /// 生效的网络列表：配置项优先，否则使用内置目录；
    /// 环境变量 `<ID>_RPC_URL` 可以覆盖单个网络的 RPC 端点
    pub fn network_configs(&self) -> Vec<NetworkConfig> {
        let mut networks = if self.networks.is_empty() {
            crate::domain::chain_config::default_networks()
        } else {
            self.networks
                .iter()
                .cloned()
                .map(NetworkSettings::into_network_config)
                .collect()
        };

        for network in &mut networks {
            let key = format!("{}_RPC_URL", network.id.to_uppercase().replace('-', "_"));
            if let Ok(url) = std::env::var(&key) {
                network.rpc_url = url;
            }
        }

        networks
    }

    /// 验证配置有效性
    ///
    /// 缺少主密钥属于致命错误：引擎不允许以隐式默认密钥运行
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.crypto.master_secret.as_deref() {
            None | Some("") => {
                return Err(EngineError::Configuration(
                    "WALLET_ENC_KEY must be set".into(),
                ))
            }
            Some(secret) if secret.len() < 16 => {
                return Err(EngineError::Configuration(
                    "WALLET_ENC_KEY too short (min 16)".into(),
                ))
            }
            Some(_) => {}
        }

        if self.session.default_ttl_secs == 0 || self.session.max_ttl_secs == 0 {
            return Err(EngineError::Configuration(
                "session TTLs must be positive".into(),
            ));
        }
        if self.session.default_ttl_secs > self.session.max_ttl_secs {
            return Err(EngineError::Configuration(
                "SESSION_DEFAULT_TTL_SECS exceeds SESSION_MAX_TTL_SECS".into(),
            ));
        }

        let networks = self.network_configs();
        if networks.is_empty() {
            return Err(EngineError::Configuration("no networks configured".into()));
        }
        if !networks.iter().any(|n| n.id == self.default_network) {
            return Err(EngineError::Configuration(format!(
                "default network {} is not configured",
                self.default_network
            )));
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(EngineError::Configuration(format!(
                "LOG_LEVEL must be one of: {:?}",
                valid_levels
            )));
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            return Err(EngineError::Configuration(
                "LOG_FORMAT must be 'json' or 'text'".into(),
            ));
        }

        Ok(())
    }
}
