//! IronVault 主入口

use anyhow::{Context, Result};
use ironvault::{app_state::AppState, config::Config, infrastructure::logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 加载配置（CONFIG_PATH 可选）
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // 3. 初始化日志
    init_logging(&config.logging)?;
    tracing::info!(config_path = ?config_path, "Starting IronVault signing engine");

    // 4. 校验配置：缺少主密钥直接终止
    config
        .validate()
        .context("Invalid configuration, refusing to start")?;

    // 5. 构建服务
    let state = AppState::new(&config).context("Failed to initialize services")?;

    for network in state.registry.list_networks().await {
        tracing::info!(
            network = %network.id,
            name = %network.name,
            chain_id = network.chain_id,
            eip1559 = network.supports_eip1559,
            testnet = network.is_testnet,
            "Network registered"
        );
    }
    tracing::info!(active = %state.registry.active_id().await, "Active network");

    // 6. 后台任务
    let tasks = state.spawn_background_tasks();

    tracing::info!("IronVault ready");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
