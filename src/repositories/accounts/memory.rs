use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::AccountStore;
use crate::ledger::LedgerError;
use crate::models::accounts::{Account, NewAccount};

/// In-process backend: one mutex per account serializes mutations, a second
/// map keeps referral codes unique. Used by single-process deployments and
/// the test suite.
pub struct MemoryAccountStore {
    accounts: DashMap<String, Arc<Mutex<Account>>>,
    codes: DashMap<String, String>,
    next_id: AtomicI64,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        MemoryAccountStore {
            accounts: DashMap::new(),
            codes: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn handle(&self, external_id: &str) -> Option<Arc<Mutex<Account>>> {
        self.accounts
            .get(external_id)
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        MemoryAccountStore::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_or_create(&self, new: NewAccount) -> Result<(Account, bool), LedgerError> {
        // reserve the code before the account becomes visible
        match self.codes.entry(new.referral_code.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::Conflict(
                    "referral code already in use".to_string(),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(new.external_id.clone());
            }
        }

        let existing = match self.accounts.entry(new.external_id.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let account = Account {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    external_id: new.external_id,
                    display_name: new.display_name,
                    balance: 0,
                    referral_code: new.referral_code,
                    referred_by: new.referred_by,
                    referral_points: 0,
                    last_mined: None,
                    last_spun: None,
                    last_spin_reward: 0,
                    quests_completed: Vec::new(),
                    wallet_address: None,
                    created_at: Utc::now(),
                };
                entry.insert(Arc::new(Mutex::new(account.clone())));
                return Ok((account, true));
            }
        };

        // lost the creation race or already registered: discard the reserved
        // code and hand back the winner's row
        self.codes.remove(&new.referral_code);
        let account = existing.lock().await.clone();
        Ok((account, false))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Account>, LedgerError> {
        match self.handle(external_id) {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        let external_id = match self.codes.get(code) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        self.find_by_external_id(&external_id).await
    }

    async fn apply_mutation<R, F>(
        &self,
        external_id: &str,
        mutation: F,
    ) -> Result<(Account, R), LedgerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Account) -> Result<R, LedgerError> + Send + 'static,
    {
        let handle = self
            .handle(external_id)
            .ok_or_else(|| LedgerError::NotRegistered(external_id.to_string()))?;

        let mut guard = handle.lock().await;
        let mut updated = guard.clone();
        let value = mutation(&mut updated)?;
        *guard = updated.clone();
        Ok((updated, value))
    }

    async fn top_by_balance(&self, limit: i64) -> Result<Vec<Account>, LedgerError> {
        let mut rows = Vec::with_capacity(self.accounts.len());
        let handles: Vec<Arc<Mutex<Account>>> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handle in handles {
            rows.push(handle.lock().await.clone());
        }

        rows.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
