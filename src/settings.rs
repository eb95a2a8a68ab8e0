use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Rewards {
    pub mine_cooldown_seconds: u64,
    pub spin_cooldown_seconds: u64,
    pub mine_reward_range: Vec<i64>,
    pub spin_reward_range: Vec<i64>,
    pub quest_reward_range: Vec<i64>,
    pub amount_precision: u32,
}

#[derive(Debug, Deserialize)]
pub struct Referral {
    pub referrer_bonus: i64,
    pub signup_bonus: i64,
}

#[derive(Debug, Deserialize)]
pub struct LedgerOptions {
    pub auto_register: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub storage: Storage,
    pub postgres: Option<Postgres>,
    pub server: Server,
    pub rewards: Rewards,
    pub referral: Referral,
    pub ledger: LedgerOptions,
}

impl Settings {
    /// Every knob has a documented default; the config file only needs to
    /// override what differs per deployment.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("storage.backend", "postgres")?
            .set_default("server.listen", "0.0.0.0:8080")?
            .set_default("rewards.mine_cooldown_seconds", 60i64)?
            .set_default("rewards.spin_cooldown_seconds", 60i64)?
            .set_default("rewards.mine_reward_range", vec![1i64, 10])?
            .set_default("rewards.spin_reward_range", vec![0i64, 15])?
            .set_default("rewards.quest_reward_range", vec![5i64, 20])?
            .set_default("rewards.amount_precision", 0i64)?
            .set_default("referral.referrer_bonus", 25i64)?
            .set_default("referral.signup_bonus", 10i64)?
            .set_default("ledger.auto_register", false)?
            .add_source(File::with_name(path).required(false))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section_but_postgres() {
        let settings = Settings::new("does-not-exist").unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
        assert!(settings.postgres.is_none());
        assert_eq!(settings.server.listen, "0.0.0.0:8080");
        assert_eq!(settings.rewards.mine_cooldown_seconds, 60);
        assert_eq!(settings.rewards.spin_reward_range, vec![0, 15]);
        assert_eq!(settings.rewards.amount_precision, 0);
        assert_eq!(settings.referral.referrer_bonus, 25);
        assert_eq!(settings.referral.signup_bonus, 10);
        assert!(!settings.ledger.auto_register);
    }
}
