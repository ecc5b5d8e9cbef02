//! 统一交易构建器
//!
//! 构建原生转账、ERC-20 转账与授权交易。构建过程从不接触签名密钥。
//!
//! 顺序：本地校验 → 网络连通性（快速失败）→ 预留 nonce → 解析费用。
//! 预留 nonce 之后的任何失败都会释放该预留。

use std::sync::Arc;

use ethers::abi::{encode, Token};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest,
    TransactionRequest, U256,
};

use crate::{
    domain::{
        chain_config::NetworkConfig,
        transaction::{FeeModel, TxKind, TxOptions, UnsignedTx},
    },
    error::{EngineError, Result},
    infrastructure::log_redact::short_address,
    service::{gas_oracle::GasOracle, network_registry::NetworkRegistry, nonce_tracker::NonceTracker},
};

/// 原生转账默认 gas limit
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;
/// ERC-20 transfer 默认 gas limit
pub const TOKEN_TRANSFER_GAS: u64 = 65_000;
/// ERC-20 approve 默认 gas limit
pub const APPROVE_GAS: u64 = 60_000;

/// transfer(address,uint256)
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// approve(address,uint256)
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

pub struct TransactionBuilder {
    registry: Arc<NetworkRegistry>,
    gas_oracle: Arc<GasOracle>,
    nonce_tracker: Arc<NonceTracker>,
}

/// 一笔待构建交易的链上调用
struct Call {
    to: Address,
    value: U256,
    data: Option<Bytes>,
    default_gas: u64,
}

impl TransactionBuilder {
    pub fn new(
        registry: Arc<NetworkRegistry>,
        gas_oracle: Arc<GasOracle>,
        nonce_tracker: Arc<NonceTracker>,
    ) -> Self {
        Self {
            registry,
            gas_oracle,
            nonce_tracker,
        }
    }

    pub fn nonce_tracker(&self) -> &Arc<NonceTracker> {
        &self.nonce_tracker
    }

    pub async fn build_native_transfer(
        &self,
        network_id: &str,
        from: Address,
        to: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<UnsignedTx> {
        require_non_zero(to, "recipient")?;
        let call = Call {
            to,
            value: amount,
            data: None,
            default_gas: NATIVE_TRANSFER_GAS,
        };
        self.build(network_id, from, TxKind::NativeTransfer, amount, call, opts)
            .await
    }

    pub async fn build_token_transfer(
        &self,
        network_id: &str,
        from: Address,
        token: Address,
        to: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<UnsignedTx> {
        require_non_zero(token, "token")?;
        require_non_zero(to, "recipient")?;
        let call = Call {
            to: token,
            value: U256::zero(),
            data: Some(erc20_call(TRANSFER_SELECTOR, to, amount)),
            default_gas: TOKEN_TRANSFER_GAS,
        };
        let kind = TxKind::TokenTransfer {
            token,
            recipient: to,
        };
        self.build(network_id, from, kind, amount, call, opts).await
    }

    pub async fn build_approve(
        &self,
        network_id: &str,
        from: Address,
        token: Address,
        spender: Address,
        amount: U256,
        opts: TxOptions,
    ) -> Result<UnsignedTx> {
        require_non_zero(token, "token")?;
        require_non_zero(spender, "spender")?;
        let call = Call {
            to: token,
            value: U256::zero(),
            data: Some(erc20_call(APPROVE_SELECTOR, spender, amount)),
            default_gas: APPROVE_GAS,
        };
        let kind = TxKind::Approve { token, spender };
        self.build(network_id, from, kind, amount, call, opts).await
    }

    async fn build(
        &self,
        network_id: &str,
        from: Address,
        kind: TxKind,
        amount: U256,
        call: Call,
        opts: TxOptions,
    ) -> Result<UnsignedTx> {
        // 本地校验：不需要网络
        let network = self.registry.get(network_id).await?;
        if matches!(opts.fee, FeeModel::FeeMarket { .. }) && !network.supports_eip1559 {
            return Err(EngineError::InsufficientParameters(format!(
                "{} does not support EIP-1559 fee fields, use gas_price",
                network_id
            )));
        }
        let gas_limit = opts.gas_limit.unwrap_or_else(|| U256::from(call.default_gas));

        // 断开的网络在预留 nonce 之前就失败
        let network = self.registry.connection(network_id).await?.config;

        let nonce = self
            .nonce_tracker
            .resolve(network_id, from, opts.nonce)
            .await?;

        let fee = match self.resolve_fee(&network, opts.fee).await {
            Ok(fee) => fee,
            Err(e) => {
                if opts.nonce.is_none() {
                    self.nonce_tracker.release(network_id, from, nonce).await;
                }
                return Err(e);
            }
        };

        let tx = assemble(&network, from, &call, gas_limit, nonce, fee);

        tracing::info!(
            network = %network_id,
            from = %short_address(&from),
            to = %short_address(&call.to),
            kind = ?kind,
            nonce = %nonce,
            gas_limit = %gas_limit,
            fee_market = matches!(fee, ResolvedFee::FeeMarket { .. }),
            "Transaction built"
        );

        Ok(UnsignedTx {
            network_id: network_id.to_string(),
            chain_id: network.chain_id,
            from,
            kind,
            amount,
            tx,
        })
    }

    /// 未指定费用时查询 GasOracle，支持 EIP-1559 的网络默认使用 EIP-1559
    async fn resolve_fee(&self, network: &NetworkConfig, fee: FeeModel) -> Result<ResolvedFee> {
        match fee {
            FeeModel::Legacy { gas_price } => Ok(ResolvedFee::Legacy { gas_price }),
            FeeModel::FeeMarket {
                max_priority_fee_per_gas,
                max_fee_per_gas,
            } => Ok(ResolvedFee::FeeMarket {
                max_priority_fee_per_gas,
                max_fee_per_gas,
            }),
            FeeModel::Unspecified => {
                let suggestion = self.gas_oracle.suggest(&network.id).await?;
                Ok(match suggestion.fee_market {
                    Some(fm) => ResolvedFee::FeeMarket {
                        max_priority_fee_per_gas: fm.tip_cap,
                        max_fee_per_gas: fm.max_fee,
                    },
                    None => ResolvedFee::Legacy {
                        gas_price: suggestion.gas_price,
                    },
                })
            }
        }
    }
}

/// 已解析的费用：不再存在"未指定"状态
#[derive(Debug, Clone, Copy)]
enum ResolvedFee {
    Legacy {
        gas_price: U256,
    },
    FeeMarket {
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
    },
}

fn assemble(
    network: &NetworkConfig,
    from: Address,
    call: &Call,
    gas_limit: U256,
    nonce: U256,
    fee: ResolvedFee,
) -> TypedTransaction {
    match fee {
        ResolvedFee::FeeMarket {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        } => {
            let mut req = Eip1559TransactionRequest::new()
                .from(from)
                .to(call.to)
                .value(call.value)
                .gas(gas_limit)
                .nonce(nonce)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .max_fee_per_gas(max_fee_per_gas)
                .chain_id(network.chain_id);
            if let Some(data) = &call.data {
                req = req.data(data.clone());
            }
            TypedTransaction::Eip1559(req)
        }
        ResolvedFee::Legacy { gas_price } => {
            let mut req = TransactionRequest::new()
                .from(from)
                .to(call.to)
                .value(call.value)
                .gas(gas_limit)
                .gas_price(gas_price)
                .nonce(nonce)
                .chain_id(network.chain_id);
            if let Some(data) = &call.data {
                req = req.data(data.clone());
            }
            TypedTransaction::Legacy(req)
        }
    }
}

fn erc20_call(selector: [u8; 4], address: Address, amount: U256) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(encode(&[Token::Address(address), Token::Uint(amount)]));
    Bytes::from(data)
}

fn require_non_zero(address: Address, role: &str) -> Result<()> {
    if address.is_zero() {
        return Err(EngineError::InvalidAddress(format!(
            "{} must not be the zero address",
            role
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_match_signatures() {
        assert_eq!(ethers::utils::id("transfer(address,uint256)"), TRANSFER_SELECTOR);
        assert_eq!(ethers::utils::id("approve(address,uint256)"), APPROVE_SELECTOR);
    }

    #[test]
    fn test_erc20_calldata_layout() {
        let to = Address::repeat_byte(0x11);
        let data = erc20_call(TRANSFER_SELECTOR, to, U256::from(1_000_000u64));
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[..4], &TRANSFER_SELECTOR);
        assert_eq!(&data[16..36], to.as_bytes());
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(1_000_000u64));
    }

    #[test]
    fn test_zero_address_rejected() {
        assert!(matches!(
            require_non_zero(Address::zero(), "recipient"),
            Err(EngineError::InvalidAddress(_))
        ));
        assert!(require_non_zero(Address::repeat_byte(1), "recipient").is_ok());
    }
}
