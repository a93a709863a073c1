mod config;
mod contract;
mod database;
mod error;
mod scheduler;
mod server;
mod timer;
mod types;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;

use crate::config::{init_tracing, Config};
use crate::contract::{HttpGateway, LotteryGateway};
use crate::database::Store;
use crate::server::AppState;
use crate::timer::LotteryTimers;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("failed to open event store at {}", config.db_path))?,
    );
    let gateway: Arc<dyn LotteryGateway> = Arc::new(HttpGateway::new(&config));
    let timers = LotteryTimers::new(store.clone(), gateway.clone(), config.default_lottery_duration_hours);
    timers
        .initialize()
        .await
        .context("failed to load lottery timers from the event store")?;

    info!(
        "lottery coordinator listening on {}:{}",
        config.bind_addr, config.port
    );

    let bind = (config.bind_addr.clone(), config.port);
    let state = AppState {
        store,
        gateway,
        timers: timers.clone(),
        config,
    };
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .service(server::health)
            .service(server::create_event)
            .service(server::list_events)
            .service(server::get_event)
            .service(server::run_scheduler)
            .service(server::trigger_lottery)
            .service(server::lottery_remaining)
    })
    .bind(bind)?
    .run()
    .await?;

    timers.shutdown().await;
    Ok(())
}
