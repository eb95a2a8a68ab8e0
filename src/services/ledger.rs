use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service};
use crate::ledger::{Ledger, LedgerError};
use crate::models::accounts::{
    Action, ActionOutcome, BalanceInfo, LeaderboardEntry, RegisterSummary,
};
use crate::repositories::accounts::AccountStore;

pub enum LedgerRequest {
    Register {
        external_id: String,
        display_name: Option<String>,
        referral_code: Option<String>,
        response: oneshot::Sender<Result<RegisterSummary, LedgerError>>,
    },
    PerformAction {
        external_id: String,
        action: Action,
        response: oneshot::Sender<Result<ActionOutcome, LedgerError>>,
    },
    GetBalance {
        external_id: String,
        response: oneshot::Sender<Result<BalanceInfo, LedgerError>>,
    },
    Leaderboard {
        limit: usize,
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, LedgerError>>,
    },
    LinkWallet {
        external_id: String,
        wallet_address: String,
        response: oneshot::Sender<Result<(), LedgerError>>,
    },
}

pub struct LedgerRequestHandler<S> {
    ledger: Arc<Ledger<S>>,
}

impl<S> Clone for LedgerRequestHandler<S> {
    fn clone(&self) -> Self {
        LedgerRequestHandler {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<S: AccountStore> LedgerRequestHandler<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        LedgerRequestHandler { ledger }
    }
}

#[async_trait]
impl<S: AccountStore> RequestHandler<LedgerRequest> for LedgerRequestHandler<S> {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Register {
                external_id,
                display_name,
                referral_code,
                response,
            } => {
                let result = self
                    .ledger
                    .register(
                        &external_id,
                        display_name.as_deref(),
                        referral_code.as_deref(),
                    )
                    .await;
                let _ = response.send(result);
            }
            LedgerRequest::PerformAction {
                external_id,
                action,
                response,
            } => {
                let result = self.ledger.perform_action(&external_id, action).await;
                let _ = response.send(result);
            }
            LedgerRequest::GetBalance {
                external_id,
                response,
            } => {
                let result = self.ledger.get_balance(&external_id).await;
                let _ = response.send(result);
            }
            LedgerRequest::Leaderboard { limit, response } => {
                let result = self.ledger.leaderboard(limit).await;
                let _ = response.send(result);
            }
            LedgerRequest::LinkWallet {
                external_id,
                wallet_address,
                response,
            } => {
                let result = self.ledger.link_wallet(&external_id, &wallet_address).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl<S: AccountStore> Service<LedgerRequest, LedgerRequestHandler<S>> for LedgerService {}
