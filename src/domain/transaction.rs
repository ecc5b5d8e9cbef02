//! 交易领域模型
//!
//! 费用模型用和类型表达：传统 gasPrice 与 EIP-1559 (tip, maxFee) 互斥，
//! 非法组合在类型层面无法构造

use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, H256, U256,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// 费用模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeModel {
    /// 未指定：使用 GasOracle 的当前建议
    #[default]
    Unspecified,
    /// 传统交易（EIP-155）
    Legacy { gas_price: U256 },
    /// EIP-1559 交易
    FeeMarket {
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
    },
}

/// 交易可选参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub fee: FeeModel,
    pub gas_limit: Option<U256>,
    /// 显式 nonce 原样使用，由调用方承担冲突风险
    pub nonce: Option<U256>,
}

impl TxOptions {
    /// 从可空的线上字段构造
    ///
    /// - 同时给出 gas_price 与 EIP-1559 字段 → InsufficientParameters
    /// - EIP-1559 字段只给出一半 → InsufficientParameters
    /// - tip 大于 max_fee → InsufficientParameters
    pub fn from_parts(
        gas_price: Option<U256>,
        max_priority_fee_per_gas: Option<U256>,
        max_fee_per_gas: Option<U256>,
        gas_limit: Option<U256>,
        nonce: Option<U256>,
    ) -> Result<Self> {
        let fee = match (gas_price, max_priority_fee_per_gas, max_fee_per_gas) {
            (None, None, None) => FeeModel::Unspecified,
            (Some(gas_price), None, None) => FeeModel::Legacy { gas_price },
            (None, Some(tip), Some(max_fee)) => {
                if tip > max_fee {
                    return Err(EngineError::InsufficientParameters(format!(
                        "max_priority_fee_per_gas {} exceeds max_fee_per_gas {}",
                        tip, max_fee
                    )));
                }
                FeeModel::FeeMarket {
                    max_priority_fee_per_gas: tip,
                    max_fee_per_gas: max_fee,
                }
            }
            (Some(_), _, _) => {
                return Err(EngineError::InsufficientParameters(
                    "gas_price cannot be combined with max_priority_fee_per_gas/max_fee_per_gas"
                        .into(),
                ))
            }
            (None, _, _) => {
                return Err(EngineError::InsufficientParameters(
                    "max_priority_fee_per_gas and max_fee_per_gas must be supplied together"
                        .into(),
                ))
            }
        };

        if gas_limit.is_some_and(|limit| limit.is_zero()) {
            return Err(EngineError::InsufficientParameters(
                "gas_limit must be positive".into(),
            ));
        }

        Ok(Self {
            fee,
            gas_limit,
            nonce,
        })
    }

    pub fn legacy(gas_price: U256) -> Self {
        Self {
            fee: FeeModel::Legacy { gas_price },
            ..Default::default()
        }
    }

    pub fn fee_market(max_priority_fee_per_gas: U256, max_fee_per_gas: U256) -> Self {
        Self {
            fee: FeeModel::FeeMarket {
                max_priority_fee_per_gas,
                max_fee_per_gas,
            },
            ..Default::default()
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

/// EIP-1559 费用建议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMarketSuggestion {
    pub base_fee: U256,
    pub tip_cap: U256,
    pub max_fee: U256,
}

/// GasOracle 的输出：传统价格总是存在，EIP-1559 字段仅在网络支持时存在
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSuggestion {
    pub chain_id: u64,
    pub gas_price: U256,
    pub fee_market: Option<FeeMarketSuggestion>,
}

/// 交易类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxKind {
    NativeTransfer,
    TokenTransfer { token: Address, recipient: Address },
    Approve { token: Address, spender: Address },
}

/// 未签名交易
///
/// 构建阶段从不接触签名密钥
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub network_id: String,
    pub chain_id: u64,
    pub from: Address,
    pub kind: TxKind,
    /// 转账金额（原生转账为 value，代币交易为代币数量）
    pub amount: U256,
    pub tx: TypedTransaction,
}

impl UnsignedTx {
    pub fn nonce(&self) -> Option<U256> {
        self.tx.nonce().copied()
    }

    pub fn gas_limit(&self) -> Option<U256> {
        self.tx.gas().copied()
    }

    pub fn is_fee_market(&self) -> bool {
        matches!(self.tx, TypedTransaction::Eip1559(_))
    }

    /// 实际采用的费用模型
    pub fn fee(&self) -> FeeModel {
        match &self.tx {
            TypedTransaction::Eip1559(tx) => match (tx.max_priority_fee_per_gas, tx.max_fee_per_gas) {
                (Some(tip), Some(max_fee)) => FeeModel::FeeMarket {
                    max_priority_fee_per_gas: tip,
                    max_fee_per_gas: max_fee,
                },
                _ => FeeModel::Unspecified,
            },
            other => match other.gas_price() {
                Some(gas_price) => FeeModel::Legacy { gas_price },
                None => FeeModel::Unspecified,
            },
        }
    }

    /// 最大手续费 = gas_limit × (gasPrice 或 maxFeePerGas)
    pub fn max_fee_cost(&self) -> Option<U256> {
        let gas = self.gas_limit()?;
        let price = match self.fee() {
            FeeModel::Legacy { gas_price } => gas_price,
            FeeModel::FeeMarket {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
            FeeModel::Unspecified => return None,
        };
        gas.checked_mul(price)
    }
}

/// 已签名交易
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTx {
    pub network_id: String,
    pub from: Address,
    pub nonce: U256,
    /// RLP 编码的原始交易（可直接 eth_sendRawTransaction）
    pub raw: Bytes,
    pub tx_hash: H256,
}
