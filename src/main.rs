use accounts::{
    config::AppConfig,
    db,
    users::{status, UserRepository},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "accounts=debug,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("migrations applied");

    let repo = UserRepository::with_pool(pool.clone());
    let users = repo.get_all().await?;
    let active = users.iter().filter(|u| u.can_authenticate()).count();
    let pending = users
        .iter()
        .filter(|u| u.status == status::PENDING)
        .count();
    tracing::info!(total = users.len(), active, pending, "accounts ready");

    pool.close().await;
    Ok(())
}
