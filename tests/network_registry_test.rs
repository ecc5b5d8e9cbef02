//! 多网络注册表测试

mod common;

use std::{sync::Arc, time::Duration};

use common::{network, test_address, test_app_state, test_networks, MockChainClient};
use ethers::types::U256;
use ironvault::{
    api::dto::CrossChainBalanceResponse,
    domain::ConnectionStatus,
    infrastructure::rpc_client::ChainClient,
    service::NetworkRegistry,
    EngineError,
};

#[tokio::test]
async fn test_cross_chain_balance_partial_result() {
    let networks = test_networks();
    networks
        .sepolia
        .set_balance(test_address(), U256::exp10(18));
    networks
        .registry
        .set_status("legacy", ConnectionStatus::Disconnected)
        .await
        .unwrap();

    let result = networks
        .registry
        .cross_chain_balance(test_address(), &[])
        .await;

    assert!(!result.is_complete());
    assert_eq!(result.balances.get("sepolia"), Some(&U256::exp10(18)));
    assert!(matches!(
        result.errors.get("legacy"),
        Some(EngineError::NetworkUnavailable(_))
    ));

    let response = CrossChainBalanceResponse::from(&result);
    assert_eq!(response.balances["sepolia"], "1000000000000000000");
    assert_eq!(response.errors["legacy"].code, "network_unavailable");
}

#[tokio::test]
async fn test_cross_chain_balance_transport_error_and_unknown_id() {
    let networks = test_networks();
    networks.legacy.set_online(false);

    let ids = vec!["sepolia".to_string(), "legacy".into(), "fantom".into()];
    let result = networks
        .registry
        .cross_chain_balance(test_address(), &ids)
        .await;

    assert_eq!(result.balances.get("sepolia"), Some(&U256::zero()));
    assert!(matches!(
        result.errors.get("legacy"),
        Some(EngineError::Rpc { .. })
    ));
    assert!(matches!(
        result.errors.get("fantom"),
        Some(EngineError::NetworkNotFound(_))
    ));
}

#[tokio::test]
async fn test_switch_active() {
    let networks = test_networks();
    assert_eq!(networks.registry.active_id().await, "sepolia");

    let active = networks.registry.switch_active("legacy").await.unwrap();
    assert_eq!(active.chain_id, 1337);
    assert_eq!(networks.registry.active().await.unwrap().id, "legacy");

    assert!(matches!(
        networks.registry.switch_active("fantom").await,
        Err(EngineError::NetworkNotFound(_))
    ));
    // 失败的切换不改变活动网络
    assert_eq!(networks.registry.active_id().await, "legacy");
}

#[tokio::test]
async fn test_refresh_tracks_connectivity() {
    let networks = test_networks();

    networks.legacy.set_online(false);
    let status = networks.registry.refresh("legacy").await.unwrap();
    assert_eq!(status, ConnectionStatus::Disconnected);
    assert!(matches!(
        networks.registry.client("legacy").await,
        Err(EngineError::NetworkUnavailable(_))
    ));

    networks.legacy.set_online(true);
    let statuses = networks.registry.refresh_all().await;
    assert!(statuses
        .iter()
        .all(|(_, status)| *status == ConnectionStatus::Connected));

    let legacy = networks.registry.get("legacy").await.unwrap();
    assert_eq!(legacy.latest_block, Some(19_000_000));
    assert!(legacy.is_connected());
}

#[tokio::test]
async fn test_background_refresher_recovers_network() {
    let networks = test_networks();
    networks
        .registry
        .set_status("sepolia", ConnectionStatus::Disconnected)
        .await
        .unwrap();

    let refresher = Arc::clone(&networks.registry).spawn_refresher(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(350)).await;
    refresher.abort();

    assert!(networks.registry.get("sepolia").await.unwrap().is_connected());
}

#[tokio::test]
async fn test_list_networks_keeps_configured_order() {
    let networks = test_networks();
    let ids: Vec<String> = networks
        .registry
        .list_networks()
        .await
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["sepolia", "legacy"]);
}

#[test]
fn test_registry_construction_errors() {
    let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::new());

    assert!(matches!(
        NetworkRegistry::with_clients(Vec::new(), "sepolia"),
        Err(EngineError::Configuration(_))
    ));
    assert!(matches!(
        NetworkRegistry::with_clients(
            vec![
                (network("a", 1, true), Arc::clone(&client)),
                (network("a", 2, true), Arc::clone(&client)),
            ],
            "a"
        ),
        Err(EngineError::Configuration(_))
    ));
    assert!(matches!(
        NetworkRegistry::with_clients(vec![(network("a", 1, true), client)], "b"),
        Err(EngineError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_wallet_cross_chain_balance_and_gas() {
    let (state, networks) = test_app_state();
    networks.legacy.set_balance(test_address(), U256::from(5u64));

    let result = state.wallet.cross_chain_balance(test_address(), &[]).await;
    assert!(result.is_complete());
    assert_eq!(result.balances["legacy"], U256::from(5u64));

    // 不指定网络时使用活动网络
    let suggestion = state.wallet.gas_suggestion(None).await.unwrap();
    assert_eq!(suggestion.chain_id, 11155111);
    assert!(suggestion.fee_market.is_some());

    let legacy = state.wallet.gas_suggestion(Some("legacy")).await.unwrap();
    assert!(legacy.fee_market.is_none());
}
