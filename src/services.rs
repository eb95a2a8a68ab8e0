use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;

use crate::ledger::Ledger;
use crate::referral::ReferralConfig;
use crate::repositories::accounts::memory::MemoryAccountStore;
use crate::repositories::accounts::{AccountStore, PostgresAccountStore};
use crate::rewards::{RewardConfig, RewardEngine};
use crate::settings::{Settings, StorageBackend};

mod http;
mod ledger;

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(settings: Settings) -> Result<(), anyhow::Error> {
    match settings.storage.backend {
        StorageBackend::Postgres => {
            let postgres = settings.postgres.as_ref().ok_or_else(|| {
                anyhow::anyhow!("postgres backend selected but [postgres] is missing")
            })?;
            let conn = PgPoolOptions::new()
                .max_connections(postgres.max_connections.unwrap_or(5))
                .connect(&postgres.url)
                .await?;

            let store = PostgresAccountStore::new(conn);
            store
                .ensure_schema()
                .await
                .map_err(|e| anyhow::anyhow!("could not prepare schema: {}", e))?;

            run_with_store(Arc::new(store), settings).await
        }
        StorageBackend::Memory => {
            log::warn!("using the in-memory account store, balances will not survive a restart");
            run_with_store(Arc::new(MemoryAccountStore::new()), settings).await
        }
    }
}

async fn run_with_store<S: AccountStore>(
    store: Arc<S>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let reward_config = RewardConfig::from_settings(&settings.rewards)?;
    let amount_precision = reward_config.amount_precision;

    if settings.referral.referrer_bonus < 0 || settings.referral.signup_bonus < 0 {
        anyhow::bail!("referral bonuses must not be negative");
    }
    let referral = ReferralConfig {
        referrer_bonus: settings.referral.referrer_bonus,
        signup_bonus: settings.referral.signup_bonus,
    };

    let account_ledger = Arc::new(Ledger::new(
        store,
        RewardEngine::new(reward_config),
        referral,
        settings.ledger.auto_register,
    ));

    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);

    println!("[*] Starting ledger service.");
    let mut ledger_service = ledger::LedgerService::new();
    tokio::spawn(async move {
        ledger_service
            .run(
                ledger::LedgerRequestHandler::new(account_ledger),
                &mut ledger_rx,
            )
            .await;
    });

    println!("[*] Starting HTTP server.");
    http::start_http_server(ledger_tx, &settings.server.listen, amount_precision).await
}
