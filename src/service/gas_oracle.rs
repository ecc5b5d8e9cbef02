//! Gas 费用建议
//!
//! 传统 gasPrice 总是给出；支持 EIP-1559 且最新区块带 baseFee 的网络
//! 同时给出 (baseFee, tip, maxFee)，maxFee = baseFee × 2 + tip。

use std::sync::Arc;

use ethers::types::U256;

use crate::{
    domain::transaction::{FeeMarketSuggestion, GasSuggestion},
    error::{EngineError, Result},
    service::network_registry::NetworkRegistry,
};

const BASE_FEE_MULTIPLIER: u64 = 2;

pub struct GasOracle {
    registry: Arc<NetworkRegistry>,
}

impl GasOracle {
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self { registry }
    }

    pub async fn suggest(&self, network_id: &str) -> Result<GasSuggestion> {
        let conn = self.registry.connection(network_id).await?;
        let network = &conn.config;

        let gas_price = conn
            .client
            .gas_price()
            .await
            .map_err(|e| EngineError::rpc(network_id, e))?;

        let fee_market = if network.supports_eip1559 {
            let base_fee = conn
                .client
                .base_fee()
                .await
                .map_err(|e| EngineError::rpc(network_id, e))?;

            match base_fee {
                Some(base_fee) => {
                    let tip_cap = match conn.client.max_priority_fee().await {
                        Ok(tip) => tip,
                        Err(e) => {
                            tracing::debug!(
                                network = %network_id,
                                error = %e,
                                fallback_wei = network.default_priority_fee_wei,
                                "eth_maxPriorityFeePerGas unavailable, using default tip"
                            );
                            U256::from(network.default_priority_fee_wei)
                        }
                    };
                    Some(FeeMarketSuggestion {
                        base_fee,
                        tip_cap,
                        max_fee: max_fee(base_fee, tip_cap),
                    })
                }
                None => {
                    tracing::debug!(network = %network_id, "Latest block has no base fee, legacy only");
                    None
                }
            }
        } else {
            None
        };

        let suggestion = GasSuggestion {
            chain_id: network.chain_id,
            gas_price,
            fee_market,
        };

        self.registry
            .record_gas_suggestion(network_id, suggestion)
            .await?;

        tracing::debug!(
            network = %network_id,
            gas_price = %gas_price,
            fee_market = suggestion.fee_market.is_some(),
            "Gas suggestion refreshed"
        );

        Ok(suggestion)
    }
}

pub fn max_fee(base_fee: U256, tip_cap: U256) -> U256 {
    base_fee
        .saturating_mul(U256::from(BASE_FEE_MULTIPLIER))
        .saturating_add(tip_cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_fee_formula() {
        let gwei = U256::exp10(9);
        assert_eq!(max_fee(gwei * 30, gwei * 2), gwei * 62);
        assert_eq!(max_fee(U256::zero(), gwei), gwei);
        assert_eq!(max_fee(U256::MAX, gwei), U256::MAX);
    }
}
