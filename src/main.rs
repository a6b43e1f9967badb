use anyhow::Context;
use vocab_srs::api::{app_router, ApiState};
use vocab_srs::config::Config;
use vocab_srs::db::Db;
use vocab_srs::quiz::QuizService;
use vocab_srs::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let db = Db::new(&config.database_url).await?;

    let scheduler = Scheduler::new(db, config.quiz);
    let state = ApiState {
        quiz: QuizService::new(scheduler),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    log::info!("listening on {}", config.bind_addr);

    axum::serve(listener, app_router(state)).await?;

    Ok(())
}
