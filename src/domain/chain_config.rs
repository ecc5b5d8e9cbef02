//! 多链网络配置模块
//!
//! 定义所有支持的 EVM 网络及其运行时状态（连接状态、最新区块、最近一次 Gas 建议）

use serde::{Deserialize, Serialize};

use crate::domain::transaction::GasSuggestion;

/// 网络连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 网络标识（ethereum, bsc, polygon ...）
    pub id: String,
    /// 显示名称
    pub name: String,
    /// EIP-155 链 ID
    pub chain_id: u64,
    /// 原生代币符号
    pub native_symbol: String,
    /// 原生代币精度
    pub decimals: u8,
    /// RPC 端点
    pub rpc_url: String,
    /// 是否为测试网
    pub is_testnet: bool,
    /// 是否支持 EIP-1559 交易
    pub supports_eip1559: bool,
    /// eth_maxPriorityFeePerGas 不可用时的兜底小费（Wei）
    pub default_priority_fee_wei: u64,
    /// 最近一次观测到的区块高度
    pub latest_block: Option<u64>,
    /// 最近一次 Gas 建议
    pub last_gas: Option<GasSuggestion>,
    pub status: ConnectionStatus,
}

impl NetworkConfig {
    /// 新网络默认视为已连接，由后台刷新任务纠正
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        chain_id: u64,
        native_symbol: impl Into<String>,
        decimals: u8,
        rpc_url: impl Into<String>,
        is_testnet: bool,
        supports_eip1559: bool,
        default_priority_fee_wei: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chain_id,
            native_symbol: native_symbol.into(),
            decimals,
            rpc_url: rpc_url.into(),
            is_testnet,
            supports_eip1559,
            default_priority_fee_wei,
            latest_block: None,
            last_gas: None,
            status: ConnectionStatus::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

const GWEI: u64 = 1_000_000_000;

/// 内置网络目录
pub fn default_networks() -> Vec<NetworkConfig> {
    vec![
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 主网
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        NetworkConfig::new(
            "ethereum",
            "Ethereum",
            1,
            "ETH",
            18,
            "https://eth.llamarpc.com",
            false,
            true,
            2 * GWEI,
        ),
        // BSC 的 baseFee 恒为 0，按传统 gasPrice 处理
        NetworkConfig::new(
            "bsc",
            "BNB Smart Chain",
            56,
            "BNB",
            18,
            "https://bsc-dataseed.binance.org",
            false,
            false,
            GWEI,
        ),
        // Polygon 需要更高的小费
        NetworkConfig::new(
            "polygon",
            "Polygon",
            137,
            "MATIC",
            18,
            "https://polygon-rpc.com",
            false,
            true,
            30 * GWEI,
        ),
        NetworkConfig::new(
            "arbitrum",
            "Arbitrum One",
            42161,
            "ETH",
            18,
            "https://arb1.arbitrum.io/rpc",
            false,
            true,
            0,
        ),
        NetworkConfig::new(
            "optimism",
            "Optimism",
            10,
            "ETH",
            18,
            "https://mainnet.optimism.io",
            false,
            true,
            GWEI / 1000,
        ),
        NetworkConfig::new(
            "base",
            "Base",
            8453,
            "ETH",
            18,
            "https://mainnet.base.org",
            false,
            true,
            GWEI / 1000,
        ),
        NetworkConfig::new(
            "avalanche",
            "Avalanche C-Chain",
            43114,
            "AVAX",
            18,
            "https://api.avax.network/ext/bc/C/rpc",
            false,
            true,
            GWEI,
        ),
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 测试网
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        NetworkConfig::new(
            "sepolia",
            "Ethereum Sepolia",
            11155111,
            "ETH",
            18,
            "https://rpc.sepolia.org",
            true,
            true,
            GWEI,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_catalogue_ids_and_chain_ids_are_unique() {
        let networks = default_networks();
        let ids: HashSet<_> = networks.iter().map(|n| n.id.clone()).collect();
        let chain_ids: HashSet<_> = networks.iter().map(|n| n.chain_id).collect();
        assert_eq!(ids.len(), networks.len());
        assert_eq!(chain_ids.len(), networks.len());
    }

    #[test]
    fn test_new_network_starts_connected() {
        let network = NetworkConfig::new("local", "Local", 31337, "ETH", 18, "", true, true, 0);
        assert!(network.is_connected());
        assert!(network.latest_block.is_none());
        assert!(network.last_gas.is_none());
    }

    #[test]
    fn test_bsc_is_legacy_only() {
        let bsc = default_networks()
            .into_iter()
            .find(|n| n.id == "bsc")
            .unwrap();
        assert!(!bsc.supports_eip1559);
        assert_eq!(bsc.native_symbol, "BNB");
    }
}
