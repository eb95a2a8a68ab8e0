use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use super::AppState;
use crate::ledger::LedgerError;
use crate::models::accounts::Action;
use crate::services::ledger::LedgerRequest;
use crate::utils::{ceil_seconds, format_amount};

#[derive(Deserialize)]
pub struct RegisterRequest {
    external_id: String,
    display_name: Option<String>,
    referral_code: Option<String>,
}

#[derive(Deserialize)]
pub struct ActionRequest {
    external_id: String,
}

#[derive(Deserialize)]
pub struct QuestRequest {
    external_id: String,
    quest_id: String,
}

#[derive(Deserialize)]
pub struct LinkWalletRequest {
    external_id: String,
    wallet_address: String,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    limit: Option<usize>,
}

fn channel_failure(detail: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal server error",
            "details": detail
        })),
    )
}

fn ledger_failure(err: LedgerError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        LedgerError::NotRegistered(_) => StatusCode::NOT_FOUND,
        LedgerError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match &err {
        LedgerError::CooldownActive { remaining } => json!({
            "accepted": false,
            "error": err.to_string(),
            "wait_remaining_secs": ceil_seconds(*remaining)
        }),
        _ => json!({ "error": err.to_string() }),
    };

    (status, Json(body))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let (register_tx, register_rx) = oneshot::channel();

    let sent = state
        .ledger_channel
        .send(LedgerRequest::Register {
            external_id: req.external_id,
            display_name: req.display_name,
            referral_code: req.referral_code,
            response: register_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_failure(e.to_string());
    }

    match register_rx.await {
        Ok(Ok(summary)) => {
            let status = if summary.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({
                    "external_id": summary.external_id,
                    "display_name": summary.display_name,
                    "referral_code": summary.referral_code,
                    "balance": summary.balance,
                    "balance_display": format_amount(summary.balance, state.amount_precision),
                    "created": summary.created
                })),
            )
        }
        Ok(Err(err)) => ledger_failure(err),
        Err(e) => channel_failure(e.to_string()),
    }
}

async fn perform(state: AppState, external_id: String, action: Action) -> (StatusCode, Json<Value>) {
    let (action_tx, action_rx) = oneshot::channel();

    let sent = state
        .ledger_channel
        .send(LedgerRequest::PerformAction {
            external_id,
            action,
            response: action_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_failure(e.to_string());
    }

    match action_rx.await {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(json!({
                "accepted": true,
                "action": outcome.kind.as_str(),
                "amount": outcome.amount,
                "amount_display": format_amount(outcome.amount, state.amount_precision),
                "balance": outcome.balance,
                "balance_display": format_amount(outcome.balance, state.amount_precision)
            })),
        ),
        Ok(Err(err)) => ledger_failure(err),
        Err(e) => channel_failure(e.to_string()),
    }
}

pub async fn mine(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> impl IntoResponse {
    perform(state, req.external_id, Action::Mine).await
}

pub async fn spin(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> impl IntoResponse {
    perform(state, req.external_id, Action::Spin).await
}

pub async fn quest(
    State(state): State<AppState>,
    Json(req): Json<QuestRequest>,
) -> impl IntoResponse {
    perform(
        state,
        req.external_id,
        Action::Quest {
            quest_id: req.quest_id,
        },
    )
    .await
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> impl IntoResponse {
    let (balance_tx, balance_rx) = oneshot::channel();

    let sent = state
        .ledger_channel
        .send(LedgerRequest::GetBalance {
            external_id,
            response: balance_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_failure(e.to_string());
    }

    match balance_rx.await {
        Ok(Ok(info)) => (
            StatusCode::OK,
            Json(json!({
                "balance": info.balance,
                "balance_display": format_amount(info.balance, state.amount_precision),
                "referral_code": info.referral_code,
                "referral_points": info.referral_points,
                "wallet_address": info.wallet_address
            })),
        ),
        Ok(Err(err)) => ledger_failure(err),
        Err(e) => channel_failure(e.to_string()),
    }
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> impl IntoResponse {
    let (board_tx, board_rx) = oneshot::channel();

    let sent = state
        .ledger_channel
        .send(LedgerRequest::Leaderboard {
            limit: params.limit.unwrap_or(10),
            response: board_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_failure(e.to_string());
    }

    match board_rx.await {
        Ok(Ok(entries)) => {
            let rows: Vec<Value> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "display_name": entry.display_name,
                        "external_id": entry.external_id,
                        "balance": entry.balance,
                        "balance_display": format_amount(entry.balance, state.amount_precision)
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "leaderboard": rows })))
        }
        Ok(Err(err)) => ledger_failure(err),
        Err(e) => channel_failure(e.to_string()),
    }
}

pub async fn link_wallet(
    State(state): State<AppState>,
    Json(req): Json<LinkWalletRequest>,
) -> impl IntoResponse {
    let (wallet_tx, wallet_rx) = oneshot::channel();

    let sent = state
        .ledger_channel
        .send(LedgerRequest::LinkWallet {
            external_id: req.external_id,
            wallet_address: req.wallet_address.clone(),
            response: wallet_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_failure(e.to_string());
    }

    match wallet_rx.await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "message": "wallet linked",
                "wallet_address": req.wallet_address
            })),
        ),
        Ok(Err(err)) => ledger_failure(err),
        Err(e) => channel_failure(e.to_string()),
    }
}
