use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::accounts::{
    Action, ActionKind, ActionOutcome, BalanceInfo, LeaderboardEntry, NewAccount,
    RegisterSummary,
};
use crate::referral::{ReferralConfig, ReferralEngine};
use crate::repositories::accounts::AccountStore;
use crate::rewards::{self, CooldownStatus, RewardEngine};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("account {0} is not registered")]
    NotRegistered(String),
    #[error("cooldown active, {} seconds remaining", .remaining.num_seconds())]
    CooldownActive { remaining: Duration },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("registration conflict: {0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Request-facing operation set. Every operation is one logical transaction
/// against a single account; per-account consistency comes from the store's
/// `apply_mutation` boundary.
pub struct Ledger<S> {
    store: Arc<S>,
    rewards: Arc<RewardEngine>,
    referral: ReferralEngine<S>,
    auto_register: bool,
}

impl<S: AccountStore> Ledger<S> {
    pub fn new(
        store: Arc<S>,
        rewards: RewardEngine,
        referral: ReferralConfig,
        auto_register: bool,
    ) -> Self {
        Ledger {
            referral: ReferralEngine::new(Arc::clone(&store), referral),
            store,
            rewards: Arc::new(rewards),
            auto_register,
        }
    }

    /// Idempotent: a known identity gets its stored row back and no bonus is
    /// ever re-applied.
    pub async fn register(
        &self,
        external_id: &str,
        display_name: Option<&str>,
        referral_code: Option<&str>,
    ) -> Result<RegisterSummary, LedgerError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(LedgerError::InvalidInput(
                "external id must not be empty".to_string(),
            ));
        }

        let display_name = match display_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "User".to_string(),
        };
        let referred_by = referral_code
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        let mut attempts = 0;
        let (account, created) = loop {
            let code = self.referral.generate_code(external_id).await?;
            let new = NewAccount {
                external_id: external_id.to_string(),
                display_name: display_name.clone(),
                referral_code: code,
                referred_by: referred_by.clone(),
            };
            match self.store.get_or_create(new).await {
                Ok(outcome) => break outcome,
                // somebody claimed the generated code first; try another
                Err(LedgerError::Conflict(_)) if attempts < 2 => attempts += 1,
                Err(e) => return Err(e),
            }
        };

        let mut balance = account.balance;
        if created {
            log::info!(
                "registered account {} with referral code {}",
                account.external_id,
                account.referral_code
            );
            balance = self.referral.link_and_reward(&account).await?;
        }

        Ok(RegisterSummary {
            external_id: account.external_id,
            display_name: account.display_name,
            referral_code: account.referral_code,
            balance,
            created,
        })
    }

    /// Cooldown check, reward draw and balance credit happen inside one store
    /// mutation, so a rejected or failed attempt changes nothing and a reward
    /// is only reported once committed.
    pub async fn perform_action(
        &self,
        external_id: &str,
        action: Action,
    ) -> Result<ActionOutcome, LedgerError> {
        let external_id = external_id.trim().to_string();
        if external_id.is_empty() {
            return Err(LedgerError::InvalidInput(
                "external id must not be empty".to_string(),
            ));
        }

        let quest_id = match &action {
            Action::Quest { quest_id } => {
                let quest_id = quest_id.trim();
                if quest_id.is_empty() {
                    return Err(LedgerError::InvalidInput(
                        "quest id must not be empty".to_string(),
                    ));
                }
                Some(quest_id.to_string())
            }
            _ => None,
        };

        if self.auto_register
            && self.store.find_by_external_id(&external_id).await?.is_none()
        {
            self.register(&external_id, None, None).await?;
        }

        let kind = action.kind();
        let now = Utc::now();
        let cooldown = self.rewards.config().cooldown(kind);
        let engine = Arc::clone(&self.rewards);

        let (account, amount) = self
            .store
            .apply_mutation(&external_id, move |account| {
                let last = match kind {
                    ActionKind::Mine => account.last_mined,
                    ActionKind::Spin => account.last_spun,
                    ActionKind::Quest => None,
                };
                if let Some(window) = cooldown {
                    if let CooldownStatus::Cooling { remaining } =
                        rewards::evaluate_cooldown(last, now, window)
                    {
                        return Err(LedgerError::CooldownActive { remaining });
                    }
                }

                let amount = engine.draw(kind);
                account.balance += amount;
                match kind {
                    ActionKind::Mine => account.last_mined = Some(now),
                    ActionKind::Spin => {
                        account.last_spun = Some(now);
                        account.last_spin_reward = amount;
                    }
                    ActionKind::Quest => {
                        if let Some(quest_id) = quest_id {
                            account.quests_completed.push(quest_id);
                        }
                    }
                }
                Ok(amount)
            })
            .await?;

        log::debug!(
            "account {} earned {} from {}, balance now {}",
            account.external_id,
            amount,
            kind.as_str(),
            account.balance
        );

        Ok(ActionOutcome {
            kind,
            amount,
            balance: account.balance,
        })
    }

    pub async fn get_balance(&self, external_id: &str) -> Result<BalanceInfo, LedgerError> {
        let external_id = external_id.trim();
        let account = self
            .store
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| LedgerError::NotRegistered(external_id.to_string()))?;

        Ok(BalanceInfo {
            balance: account.balance,
            referral_code: account.referral_code,
            referral_points: account.referral_points,
            wallet_address: account.wallet_address,
        })
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let rows = self.store.top_by_balance(limit as i64).await?;
        Ok(rows
            .into_iter()
            .map(|account| LeaderboardEntry {
                display_name: account.display_name,
                external_id: account.external_id,
                balance: account.balance,
            })
            .collect())
    }

    pub async fn link_wallet(
        &self,
        external_id: &str,
        wallet_address: &str,
    ) -> Result<(), LedgerError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(LedgerError::InvalidInput(
                "external id must not be empty".to_string(),
            ));
        }
        let address = wallet_address.trim();
        if address.is_empty() {
            return Err(LedgerError::InvalidInput(
                "wallet address must not be empty".to_string(),
            ));
        }

        let address = address.to_string();
        self.store
            .apply_mutation(external_id, move |account| {
                account.wallet_address = Some(address);
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::accounts::memory::MemoryAccountStore;
    use crate::rewards::RewardConfig;

    fn test_ledger_with(
        config: RewardConfig,
        auto_register: bool,
    ) -> (Arc<MemoryAccountStore>, Ledger<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        let ledger = Ledger::new(
            Arc::clone(&store),
            RewardEngine::with_seed(config, 7),
            ReferralConfig::default(),
            auto_register,
        );
        (store, ledger)
    }

    fn test_ledger() -> (Arc<MemoryAccountStore>, Ledger<MemoryAccountStore>) {
        test_ledger_with(RewardConfig::default(), false)
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (_, ledger) = test_ledger();

        let first = ledger.register("u1", Some("Henry"), None).await.unwrap();
        assert!(first.created);
        assert_eq!(first.balance, 0);

        let second = ledger.register("u1", Some("Henry"), None).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.referral_code, first.referral_code);
        assert_eq!(second.balance, 0);
    }

    #[tokio::test]
    async fn blank_identity_is_rejected() {
        let (_, ledger) = test_ledger();
        let result = ledger.register("   ", None, None).await;
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn missing_display_name_defaults() {
        let (_, ledger) = test_ledger();
        let summary = ledger.register("u1", None, None).await.unwrap();
        assert_eq!(summary.display_name, "User");
    }

    #[tokio::test]
    async fn referral_bonus_applies_exactly_once() {
        let (store, ledger) = test_ledger();

        let alice = ledger.register("alice", Some("Alice"), None).await.unwrap();
        let bob = ledger
            .register("bob", Some("Bob"), Some(&alice.referral_code))
            .await
            .unwrap();
        assert_eq!(bob.balance, 10);

        let referrer = store.find_by_external_id("alice").await.unwrap().unwrap();
        assert_eq!(referrer.balance, 25);
        assert_eq!(referrer.referral_points, 1);

        // re-registration must not re-trigger anything
        ledger
            .register("bob", Some("Bob"), Some(&alice.referral_code))
            .await
            .unwrap();
        // nor do bob's later actions
        ledger.perform_action("bob", Action::Mine).await.unwrap();

        let referrer = store.find_by_external_id("alice").await.unwrap().unwrap();
        assert_eq!(referrer.balance, 25);
        assert_eq!(referrer.referral_points, 1);
    }

    #[tokio::test]
    async fn unknown_referral_code_is_stored_without_bonus() {
        let (store, ledger) = test_ledger();

        let bob = ledger
            .register("bob", Some("Bob"), Some("does-not-exist"))
            .await
            .unwrap();
        assert!(bob.created);
        assert_eq!(bob.balance, 0);

        let stored = store.find_by_external_id("bob").await.unwrap().unwrap();
        assert_eq!(stored.referred_by.as_deref(), Some("does-not-exist"));
    }

    #[tokio::test]
    async fn actions_require_registration() {
        let (_, ledger) = test_ledger();
        let result = ledger.perform_action("ghost", Action::Mine).await;
        assert!(matches!(result, Err(LedgerError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn auto_register_opts_into_creation_on_first_action() {
        let (store, ledger) = test_ledger_with(RewardConfig::default(), true);

        let outcome = ledger.perform_action("ghost", Action::Mine).await.unwrap();
        assert!(outcome.amount >= 1 && outcome.amount <= 10);

        let account = store.find_by_external_id("ghost").await.unwrap().unwrap();
        assert_eq!(account.balance, outcome.amount);
    }

    #[tokio::test]
    async fn mine_is_gated_by_its_cooldown() {
        let (_, ledger) = test_ledger();
        ledger.register("u1", None, None).await.unwrap();

        let first = ledger.perform_action("u1", Action::Mine).await.unwrap();
        assert!(first.amount >= 1 && first.amount <= 10);
        assert_eq!(first.balance, first.amount);

        let second = ledger.perform_action("u1", Action::Mine).await;
        match second {
            Err(LedgerError::CooldownActive { remaining }) => {
                assert!(remaining > Duration::zero());
                assert!(remaining <= Duration::seconds(60));
            }
            other => panic!("expected cooldown rejection, got {:?}", other.map(|o| o.amount)),
        }

        // the rejection changed nothing
        let info = ledger.get_balance("u1").await.unwrap();
        assert_eq!(info.balance, first.amount);
    }

    #[tokio::test]
    async fn elapsed_cooldown_accepts_again() {
        let config = RewardConfig {
            mine_cooldown: Duration::seconds(0),
            spin_cooldown: Duration::seconds(0),
            ..RewardConfig::default()
        };
        let (_, ledger) = test_ledger_with(config, false);
        ledger.register("u1", None, None).await.unwrap();

        let first = ledger.perform_action("u1", Action::Mine).await.unwrap();
        let second = ledger.perform_action("u1", Action::Mine).await.unwrap();
        assert_eq!(second.balance, first.amount + second.amount);
    }

    #[tokio::test]
    async fn spin_records_its_last_reward() {
        let (store, ledger) = test_ledger();
        ledger.register("u1", None, None).await.unwrap();

        let outcome = ledger.perform_action("u1", Action::Spin).await.unwrap();

        let account = store.find_by_external_id("u1").await.unwrap().unwrap();
        assert_eq!(account.last_spin_reward, outcome.amount);
        assert!(account.last_spun.is_some());
        assert!(account.last_mined.is_none());
    }

    #[tokio::test]
    async fn quests_are_ungated_and_append() {
        let (store, ledger) = test_ledger();
        ledger.register("u1", None, None).await.unwrap();

        let first = ledger
            .perform_action("u1", Action::Quest { quest_id: "daily-login".to_string() })
            .await
            .unwrap();
        assert!(first.amount >= 5 && first.amount <= 20);

        let second = ledger
            .perform_action("u1", Action::Quest { quest_id: "invite-check".to_string() })
            .await
            .unwrap();
        assert_eq!(second.balance, first.amount + second.amount);

        let account = store.find_by_external_id("u1").await.unwrap().unwrap();
        assert_eq!(account.quests_completed, vec!["daily-login", "invite-check"]);

        let blank = ledger
            .perform_action("u1", Action::Quest { quest_id: "  ".to_string() })
            .await;
        assert!(matches!(blank, Err(LedgerError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn balance_reports_referral_fields() {
        let (_, ledger) = test_ledger();
        let summary = ledger.register("u1", None, None).await.unwrap();

        let info = ledger.get_balance("u1").await.unwrap();
        assert_eq!(info.balance, 0);
        assert_eq!(info.referral_code, summary.referral_code);
        assert_eq!(info.referral_points, 0);
        assert!(info.wallet_address.is_none());

        let missing = ledger.get_balance("ghost").await;
        assert!(matches!(missing, Err(LedgerError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn leaderboard_orders_by_balance() {
        let (store, ledger) = test_ledger();
        for (external_id, balance) in [("u1", 10), ("u2", 30), ("u3", 20)] {
            ledger.register(external_id, None, None).await.unwrap();
            store
                .apply_mutation(external_id, move |account| {
                    account.balance = balance;
                    Ok(())
                })
                .await
                .unwrap();
        }

        let top = ledger.leaderboard(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].external_id, "u2");
        assert_eq!(top[0].balance, 30);
        assert_eq!(top[1].external_id, "u3");
        assert_eq!(top[1].balance, 20);
    }

    #[tokio::test]
    async fn link_wallet_validates_and_persists() {
        let (_, ledger) = test_ledger();

        let missing = ledger.link_wallet("ghost", "addr-1").await;
        assert!(matches!(missing, Err(LedgerError::NotRegistered(_))));

        ledger.register("u1", None, None).await.unwrap();

        let blank = ledger.link_wallet("u1", "   ").await;
        assert!(matches!(blank, Err(LedgerError::InvalidInput(_))));

        ledger.link_wallet("u1", "bc1q-example").await.unwrap();
        let info = ledger.get_balance("u1").await.unwrap();
        assert_eq!(info.wallet_address.as_deref(), Some("bc1q-example"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mining_accepts_exactly_once_per_window() {
        let (store, ledger) = test_ledger();
        let ledger = Arc::new(ledger);
        ledger.register("u1", None, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.perform_action("u1", Action::Mine).await
            }));
        }

        let mut accepted = Vec::new();
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => accepted.push(outcome.amount),
                Err(LedgerError::CooldownActive { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(accepted.len(), 1);
        assert_eq!(rejected, 15);

        let account = store.find_by_external_id("u1").await.unwrap().unwrap();
        assert_eq!(account.balance, accepted[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_creates_one_account() {
        let (store, ledger) = test_ledger();
        let ledger = Arc::new(ledger);
        let alice = ledger.register("alice", None, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            let code = alice.referral_code.clone();
            handles.push(tokio::spawn(async move {
                ledger.register("bob", Some("Bob"), Some(&code)).await
            }));
        }

        let mut created = 0;
        let mut codes = Vec::new();
        for handle in handles {
            let summary = handle.await.unwrap().unwrap();
            if summary.created {
                created += 1;
            }
            codes.push(summary.referral_code);
        }

        assert_eq!(created, 1);
        codes.dedup();
        assert_eq!(codes.len(), 1);

        let referrer = store.find_by_external_id("alice").await.unwrap().unwrap();
        assert_eq!(referrer.referral_points, 1);
        assert_eq!(referrer.balance, 25);
    }
}
