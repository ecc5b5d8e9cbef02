//! 会话托管
//!
//! 在有限时间内托管助记词，调用方之后只需携带不透明的会话 ID。
//!
//! - 存储按会话 ID 哈希分成 16 个分片，每个分片一把读写锁
//! - 每次读取都自行检查过期时间；后台清理只负责回收内存
//! - TTL 夹在 [1s, max_ttl] 之间

use std::{
    collections::{hash_map::RandomState, HashMap},
    fmt,
    hash::BuildHasher,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use tokio::{sync::RwLock, task::JoinHandle, time::interval};
use zeroize::Zeroizing;

use crate::{
    config::SessionConfig,
    domain::{derivation::KeyDerivation, derivation_path::DerivationPath},
    error::{EngineError, Result},
    infrastructure::log_redact::redact_session_id,
};

const SHARD_COUNT: usize = 16;
const SESSION_ID_BYTES: usize = 32;
const MIN_TTL: Duration = Duration::from_secs(1);

/// 托管中的会话
pub struct Session {
    id: String,
    mnemonic: Zeroizing<String>,
    default_path: DerivationPath,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// now >= expires_at 即视为过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &redact_session_id(&self.id))
            .field("mnemonic", &"<redacted>")
            .field("default_path", &self.default_path.to_string())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// open 的返回值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

/// 从会话中读出的凭据
#[derive(Clone)]
pub struct SessionCredentials {
    pub mnemonic: Zeroizing<String>,
    pub default_path: DerivationPath,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("mnemonic", &"<redacted>")
            .field("default_path", &self.default_path.to_string())
            .finish()
    }
}

type Shard = RwLock<HashMap<String, Session>>;

pub struct SessionVault {
    shards: [Shard; SHARD_COUNT],
    hasher: RandomState,
    default_ttl: Duration,
    max_ttl: Duration,
}

impl fmt::Debug for SessionVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionVault")
            .field("default_ttl", &self.default_ttl)
            .field("max_ttl", &self.max_ttl)
            .finish_non_exhaustive()
    }
}

impl SessionVault {
    pub fn new(default_ttl: Duration, max_ttl: Duration) -> Self {
        let max_ttl = max_ttl.max(MIN_TTL);
        Self {
            shards: std::array::from_fn(|_| RwLock::new(HashMap::new())),
            hasher: RandomState::new(),
            default_ttl: default_ttl.clamp(MIN_TTL, max_ttl),
            max_ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.default_ttl(), config.max_ttl())
    }

    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    fn shard(&self, session_id: &str) -> &Shard {
        let index = (self.hasher.hash_one(session_id) as usize) % SHARD_COUNT;
        &self.shards[index]
    }

    fn clamp_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl).clamp(MIN_TTL, self.max_ttl)
    }

    /// 打开会话（使用默认派生路径）
    pub async fn open(&self, mnemonic: &str, ttl: Option<Duration>) -> Result<OpenedSession> {
        self.open_with_path(mnemonic, ttl, DerivationPath::default_evm())
            .await
    }

    pub async fn open_with_path(
        &self,
        mnemonic: &str,
        ttl: Option<Duration>,
        default_path: DerivationPath,
    ) -> Result<OpenedSession> {
        KeyDerivation::validate_mnemonic(mnemonic)?;

        let ttl = self.clamp_ttl(ttl);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| EngineError::InvalidRequest(format!("ttl out of range: {}", e)))?;

        let session_id = new_session_id();
        let created_at = Utc::now();
        let expires_at = created_at + ttl;

        let session = Session {
            id: session_id.clone(),
            mnemonic: Zeroizing::new(mnemonic.trim().to_string()),
            default_path,
            created_at,
            expires_at,
        };

        self.shard(&session_id)
            .write()
            .await
            .insert(session_id.clone(), session);

        tracing::info!(
            session = %redact_session_id(&session_id),
            ttl_secs = ttl.num_seconds(),
            expires_at = %expires_at,
            "Session opened"
        );

        Ok(OpenedSession {
            session_id,
            expires_at,
        })
    }

    /// 关闭会话，之后立即不可读
    pub async fn close(&self, session_id: &str) -> Result<()> {
        match self.shard(session_id).write().await.remove(session_id) {
            Some(_) => {
                tracing::info!(session = %redact_session_id(session_id), "Session closed");
                Ok(())
            }
            None => Err(EngineError::SessionNotFound),
        }
    }

    /// 读取会话凭据
    ///
    /// 已过期但尚未清理的会话返回 SessionExpired，并在此处移除
    pub async fn read(&self, session_id: &str) -> Result<SessionCredentials> {
        let now = Utc::now();
        let shard = self.shard(session_id);

        {
            let sessions = shard.read().await;
            match sessions.get(session_id) {
                None => return Err(EngineError::SessionNotFound),
                Some(session) if !session.is_expired_at(now) => {
                    return Ok(SessionCredentials {
                        mnemonic: session.mnemonic.clone(),
                        default_path: session.default_path.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let mut sessions = shard.write().await;
        if sessions
            .get(session_id)
            .is_some_and(|s| s.is_expired_at(now))
        {
            sessions.remove(session_id);
        }
        tracing::debug!(session = %redact_session_id(session_id), "Session expired on read");
        Err(EngineError::SessionExpired)
    }

    pub async fn read_mnemonic(&self, session_id: &str) -> Result<Zeroizing<String>> {
        Ok(self.read(session_id).await?.mnemonic)
    }

    /// 清理过期会话，返回移除数量
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut sessions = shard.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired_at(now));
            removed += before - sessions.len();
        }
        if removed > 0 {
            tracing::debug!(removed, "Expired sessions swept");
        }
        removed
    }

    /// 后台定时清理
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }

    /// 当前托管的会话数（含尚未清理的过期会话）
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn new_session_id() -> String {
    let mut bytes = Zeroizing::new([0u8; SESSION_ID_BYTES]);
    OsRng.fill_bytes(bytes.as_mut_slice());
    hex::encode(bytes.as_slice())
}
