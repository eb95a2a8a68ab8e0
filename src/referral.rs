use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::models::accounts::Account;
use crate::repositories::accounts::AccountStore;

const CODE_ATTEMPTS: usize = 8;

#[derive(Clone, Debug)]
pub struct ReferralConfig {
    pub referrer_bonus: i64,
    pub signup_bonus: i64,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        ReferralConfig {
            referrer_bonus: 25,
            signup_bonus: 10,
        }
    }
}

fn code_prefix(external_id: &str) -> String {
    let digest = Sha256::digest(external_id.as_bytes());
    digest.iter().take(3).map(|b| format!("{:02x}", b)).collect()
}

pub struct ReferralEngine<S> {
    store: Arc<S>,
    config: ReferralConfig,
}

impl<S: AccountStore> ReferralEngine<S> {
    pub fn new(store: Arc<S>, config: ReferralConfig) -> Self {
        ReferralEngine { store, config }
    }

    /// Short identity hash plus a random disambiguator. The shape is
    /// cosmetic; uniqueness is what matters, so collisions regenerate and a
    /// uuid suffix is the last resort.
    pub async fn generate_code(&self, external_id: &str) -> Result<String, LedgerError> {
        let prefix = code_prefix(external_id);

        for _ in 0..CODE_ATTEMPTS {
            let suffix: u32 = rand::rng().random_range(1000..=9999);
            let candidate = format!("{}-{}", prefix, suffix);
            if self.store.find_by_referral_code(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            log::debug!("referral code {} already taken, regenerating", candidate);
        }

        Ok(format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    /// One-time bonus application at genuine creation. An unresolvable code
    /// stays stored as plain metadata with no credit anywhere; a resolving
    /// code credits the referrer and grants the new account its signup bonus.
    /// Returns the new account's balance afterwards.
    pub async fn link_and_reward(&self, account: &Account) -> Result<i64, LedgerError> {
        let code = match account.referred_by.as_deref() {
            Some(code) => code,
            None => return Ok(account.balance),
        };

        let referrer = match self.store.find_by_referral_code(code).await? {
            Some(referrer) => referrer,
            None => {
                log::debug!(
                    "referral code {} cited by {} does not resolve, stored as metadata only",
                    code,
                    account.external_id
                );
                return Ok(account.balance);
            }
        };

        if referrer.external_id == account.external_id {
            log::warn!("account {} cited its own referral code", account.external_id);
            return Ok(account.balance);
        }

        let bonus = self.config.referrer_bonus;
        self.store
            .apply_mutation(&referrer.external_id, move |referrer| {
                referrer.balance += bonus;
                referrer.referral_points += 1;
                Ok(())
            })
            .await?;
        log::info!(
            "credited referral bonus to {} for referring {}",
            referrer.external_id,
            account.external_id
        );

        if self.config.signup_bonus == 0 {
            return Ok(account.balance);
        }

        let signup = self.config.signup_bonus;
        let (updated, _) = self
            .store
            .apply_mutation(&account.external_id, move |account| {
                account.balance += signup;
                Ok(())
            })
            .await?;
        Ok(updated.balance)
    }
}
