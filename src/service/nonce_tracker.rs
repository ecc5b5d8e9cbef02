//! Nonce 管理器
//!
//! 区分已确认（latest）与含内存池（pending）的链上 nonce，并在本地为
//! 尚未上链的交易预留 nonce，保证同一地址连续构建的交易 nonce 严格 +1。

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use ethers::types::{Address, U256};
use tokio::sync::Mutex;

use crate::{
    error::{EngineError, Result},
    infrastructure::{log_redact::short_address, rpc_client::NonceTag},
    service::network_registry::NetworkRegistry,
};

/// 本地预留闲置超过该时长即作废，以链上状态为准
pub const RESERVATION_IDLE_EXPIRY: Duration = Duration::from_secs(300);

/// 链上 nonce 快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceState {
    pub pending: U256,
    pub latest: U256,
}

impl NonceState {
    /// pending 领先时使用 pending（调用方自己的未确认交易），否则使用 latest
    pub fn candidate(&self) -> U256 {
        if self.pending > self.latest {
            self.pending
        } else {
            self.latest
        }
    }
}

#[derive(Debug)]
struct Reservation {
    next_local: U256,
    touched_at: Instant,
}

impl Reservation {
    fn is_idle(&self, idle_expiry: Duration) -> bool {
        self.touched_at.elapsed() > idle_expiry
    }
}

type SlotKey = (String, Address);
type Slot = Arc<Mutex<Option<Reservation>>>;

struct SlotTable {
    slots: HashMap<SlotKey, Slot>,
    last_pruned: Instant,
}

impl SlotTable {
    /// 移除无人持有且预留为空或已闲置过期的槽位
    fn prune_idle(&mut self, idle_expiry: Duration) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            // 表锁下 strong_count == 1 表示没有解析正在使用该槽位
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(reservation) => reservation
                    .as_ref()
                    .is_some_and(|r| !r.is_idle(idle_expiry)),
                Err(_) => true,
            }
        });
        self.last_pruned = Instant::now();
        before - self.slots.len()
    }
}

pub struct NonceTracker {
    registry: Arc<NetworkRegistry>,
    table: Mutex<SlotTable>,
    idle_expiry: Duration,
}

impl NonceTracker {
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self::with_idle_expiry(registry, RESERVATION_IDLE_EXPIRY)
    }

    pub fn with_idle_expiry(registry: Arc<NetworkRegistry>, idle_expiry: Duration) -> Self {
        Self {
            registry,
            table: Mutex::new(SlotTable {
                slots: HashMap::new(),
                last_pruned: Instant::now(),
            }),
            idle_expiry,
        }
    }

    /// 取得 (网络, 地址) 的槽位，必要时创建；每个闲置周期顺带清理一次过期槽位
    async fn slot(&self, network_id: &str, address: Address) -> Slot {
        let mut table = self.table.lock().await;
        if table.last_pruned.elapsed() > self.idle_expiry {
            let removed = table.prune_idle(self.idle_expiry);
            if removed > 0 {
                tracing::debug!(removed, "Idle nonce slots pruned");
            }
        }
        Arc::clone(
            table
                .slots
                .entry((network_id.to_string(), address))
                .or_default(),
        )
    }

    async fn existing_slot(&self, network_id: &str, address: Address) -> Option<Slot> {
        let table = self.table.lock().await;
        table
            .slots
            .get(&(network_id.to_string(), address))
            .map(Arc::clone)
    }

    /// 立即清理闲置槽位，返回移除数量
    pub async fn prune_idle(&self) -> usize {
        self.table.lock().await.prune_idle(self.idle_expiry)
    }

    /// 当前跟踪的 (网络, 地址) 槽位数
    pub async fn tracked_slots(&self) -> usize {
        self.table.lock().await.slots.len()
    }

    /// 查询链上 (pending, latest)
    pub async fn next_nonce(&self, network_id: &str, address: Address) -> Result<NonceState> {
        let client = self.registry.client(network_id).await?;
        let (pending, latest) = tokio::join!(
            client.transaction_count(address, NonceTag::Pending),
            client.transaction_count(address, NonceTag::Latest),
        );
        Ok(NonceState {
            pending: pending.map_err(|e| EngineError::rpc(network_id, e))?,
            latest: latest.map_err(|e| EngineError::rpc(network_id, e))?,
        })
    }

    /// 解析交易使用的 nonce
    ///
    /// - 显式 nonce 原样使用，不改变本地预留
    /// - 否则取 max(链上候选值, 本地下一个预留值)，并把预留推进到其之后
    ///
    /// 同一 (网络, 地址) 的解析被串行化；不同地址互不阻塞。
    pub async fn resolve(
        &self,
        network_id: &str,
        address: Address,
        explicit: Option<U256>,
    ) -> Result<U256> {
        if let Some(nonce) = explicit {
            tracing::debug!(
                network = %network_id,
                address = %short_address(&address),
                nonce = %nonce,
                "Explicit nonce used"
            );
            return Ok(nonce);
        }

        let slot = self.slot(network_id, address).await;
        let mut reservation = slot.lock().await;

        if reservation
            .as_ref()
            .is_some_and(|r| r.is_idle(self.idle_expiry))
        {
            tracing::debug!(
                network = %network_id,
                address = %short_address(&address),
                "Nonce reservation expired, falling back to chain state"
            );
            *reservation = None;
        }

        let state = self.next_nonce(network_id, address).await?;
        let nonce = match reservation.as_ref() {
            Some(r) if r.next_local > state.candidate() => r.next_local,
            _ => state.candidate(),
        };

        let next_local = nonce
            .checked_add(U256::one())
            .ok_or_else(|| EngineError::InsufficientParameters("nonce overflow".into()))?;
        *reservation = Some(Reservation {
            next_local,
            touched_at: Instant::now(),
        });

        tracing::debug!(
            network = %network_id,
            address = %short_address(&address),
            nonce = %nonce,
            "Nonce resolved"
        );
        Ok(nonce)
    }

    /// 撤销最近一次预留（构建失败或广播被明确拒绝时调用）
    ///
    /// 只有当 `nonce` 正是最近一次预留时才回退，返回是否回退
    pub async fn release(&self, network_id: &str, address: Address, nonce: U256) -> bool {
        let Some(slot) = self.existing_slot(network_id, address).await else {
            return false;
        };
        let mut reservation = slot.lock().await;
        match reservation.as_mut() {
            Some(r) if nonce.checked_add(U256::one()) == Some(r.next_local) => {
                r.next_local = nonce;
                r.touched_at = Instant::now();
                tracing::debug!(
                    network = %network_id,
                    address = %short_address(&address),
                    nonce = %nonce,
                    "Nonce reservation released"
                );
                true
            }
            _ => false,
        }
    }

    /// 丢弃本地预留，下次解析完全以链上状态为准
    pub async fn resync(&self, network_id: &str, address: Address) {
        if let Some(slot) = self.existing_slot(network_id, address).await {
            *slot.lock().await = None;
        }
        tracing::info!(
            network = %network_id,
            address = %short_address(&address),
            "Nonce state resynced from chain"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_prefers_pending_when_ahead() {
        let state = NonceState {
            pending: 7u64.into(),
            latest: 5u64.into(),
        };
        assert_eq!(state.candidate(), U256::from(7));

        let state = NonceState {
            pending: 5u64.into(),
            latest: 5u64.into(),
        };
        assert_eq!(state.candidate(), U256::from(5));

        // 节点 pending 落后时不回退
        let state = NonceState {
            pending: 3u64.into(),
            latest: 5u64.into(),
        };
        assert_eq!(state.candidate(), U256::from(5));
    }
}
