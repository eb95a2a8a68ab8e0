use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::ledger::LedgerRequest;

mod accounts;

#[derive(Clone)]
struct AppState {
    ledger_channel: mpsc::Sender<LedgerRequest>,
    amount_precision: u32,
}

pub async fn start_http_server(
    ledger_channel: mpsc::Sender<LedgerRequest>,
    listen: &str,
    amount_precision: u32,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        ledger_channel,
        amount_precision,
    };

    let app = Router::new()
        .route("/register", post(accounts::register))
        .route("/mine", post(accounts::mine))
        .route("/spin", post(accounts::spin))
        .route("/quest", post(accounts::quest))
        .route("/balance/{external_id}", get(accounts::get_balance))
        .route("/leaderboard", get(accounts::leaderboard))
        .route("/link-wallet", post(accounts::link_wallet))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    println!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
