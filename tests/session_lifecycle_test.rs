//! 会话托管生命周期测试

mod common;

use std::{sync::Arc, time::Duration};

use common::{test_app_state, TEST_MNEMONIC};
use ironvault::{
    domain::DerivationPath,
    service::{Credential, SessionVault},
    EngineError, ErrorKind,
};

#[tokio::test]
async fn test_session_expires_after_ttl() {
    let (state, _networks) = test_app_state();
    let opened = state
        .wallet
        .open_session(TEST_MNEMONIC, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    // 过期前可以派生地址
    let addresses = state
        .wallet
        .derive_addresses(&Credential::session(&opened.session_id), None, None, None)
        .await
        .unwrap();
    assert_eq!(addresses.len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let err = state
        .sessions
        .read_mnemonic(&opened.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionExpired));
    assert_eq!(err.kind(), ErrorKind::Custody);

    // 过期条目在读取时被移除
    assert!(matches!(
        state.sessions.read_mnemonic(&opened.session_id).await,
        Err(EngineError::SessionNotFound)
    ));
}

#[tokio::test]
async fn test_close_is_immediate() {
    let (state, _networks) = test_app_state();
    let opened = state
        .wallet
        .open_session(TEST_MNEMONIC, Some(Duration::from_secs(3600)))
        .await
        .unwrap();

    state.wallet.close_session(&opened.session_id).await.unwrap();

    let err = state
        .wallet
        .derive_addresses(&Credential::session(&opened.session_id), None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound));
}

#[tokio::test]
async fn test_ttl_is_clamped_to_max() {
    let vault = SessionVault::new(Duration::from_secs(60), Duration::from_secs(120));
    let before = chrono::Utc::now();
    let opened = vault
        .open(TEST_MNEMONIC, Some(Duration::from_secs(86_400)))
        .await
        .unwrap();
    let lifetime = opened.expires_at - before;
    assert!(lifetime <= chrono::Duration::seconds(121));
    assert!(lifetime >= chrono::Duration::seconds(119));
}

#[tokio::test]
async fn test_session_ids_are_unique_and_opaque() {
    let vault = SessionVault::new(Duration::from_secs(60), Duration::from_secs(120));
    let a = vault.open(TEST_MNEMONIC, None).await.unwrap();
    let b = vault.open(TEST_MNEMONIC, None).await.unwrap();
    assert_ne!(a.session_id, b.session_id);
    assert_eq!(a.session_id.len(), 64);
    assert!(a.session_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(vault.len().await, 2);
}

#[tokio::test]
async fn test_session_default_path_is_used_for_signing() {
    let vault = SessionVault::new(Duration::from_secs(60), Duration::from_secs(120));
    let path = DerivationPath::parse("m/44'/60'/0'/0/1").unwrap();
    let opened = vault
        .open_with_path(TEST_MNEMONIC, None, path.clone())
        .await
        .unwrap();
    let credentials = vault.read(&opened.session_id).await.unwrap();
    assert_eq!(credentials.default_path, path);
    assert_eq!(credentials.mnemonic.as_str(), TEST_MNEMONIC);
    assert!(!format!("{:?}", credentials).contains("abandon"));
}

#[tokio::test]
async fn test_sweeper_reclaims_expired_sessions() {
    let vault = Arc::new(SessionVault::new(
        Duration::from_secs(1),
        Duration::from_secs(10),
    ));
    for _ in 0..4 {
        vault.open(TEST_MNEMONIC, None).await.unwrap();
    }
    let keep = vault
        .open(TEST_MNEMONIC, Some(Duration::from_secs(10)))
        .await
        .unwrap();

    let sweeper = Arc::clone(&vault).spawn_sweeper(Duration::from_millis(200));
    tokio::time::sleep(Duration::from_millis(1600)).await;
    sweeper.abort();

    assert_eq!(vault.len().await, 1);
    assert!(vault.read(&keep.session_id).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let vault = Arc::new(SessionVault::new(
        Duration::from_secs(60),
        Duration::from_secs(120),
    ));
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let vault = Arc::clone(&vault);
            tokio::spawn(async move {
                let opened = vault.open(TEST_MNEMONIC, None).await.unwrap();
                let phrase = vault.read_mnemonic(&opened.session_id).await.unwrap();
                assert_eq!(phrase.as_str(), TEST_MNEMONIC);
                vault.close(&opened.session_id).await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(vault.is_empty().await);
}

#[tokio::test]
async fn test_invalid_mnemonic_is_not_stored() {
    let vault = SessionVault::new(Duration::from_secs(60), Duration::from_secs(120));
    let err = vault.open("not a mnemonic", None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidMnemonic(_)));
    assert!(vault.is_empty().await);
}
