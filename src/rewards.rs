use std::sync::Mutex;

use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::accounts::ActionKind;
use crate::settings;

#[derive(Clone, Debug)]
pub struct RewardConfig {
    pub mine_cooldown: Duration,
    pub spin_cooldown: Duration,
    pub mine_reward_range: (i64, i64),
    pub spin_reward_range: (i64, i64),
    pub quest_reward_range: (i64, i64),
    pub amount_precision: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            mine_cooldown: Duration::seconds(60),
            spin_cooldown: Duration::seconds(60),
            mine_reward_range: (1, 10),
            spin_reward_range: (0, 15),
            quest_reward_range: (5, 20),
            amount_precision: 0,
        }
    }
}

impl RewardConfig {
    pub fn from_settings(rewards: &settings::Rewards) -> Result<Self, anyhow::Error> {
        let config = RewardConfig {
            mine_cooldown: Duration::seconds(rewards.mine_cooldown_seconds as i64),
            spin_cooldown: Duration::seconds(rewards.spin_cooldown_seconds as i64),
            mine_reward_range: parse_range("mine_reward_range", &rewards.mine_reward_range)?,
            spin_reward_range: parse_range("spin_reward_range", &rewards.spin_reward_range)?,
            quest_reward_range: parse_range("quest_reward_range", &rewards.quest_reward_range)?,
            amount_precision: rewards.amount_precision,
        };

        if config.amount_precision > 8 {
            bail!("amount_precision must be at most 8 decimal places");
        }

        Ok(config)
    }

    /// The minimum interval between two accepted actions of this kind.
    /// Quests are not time-gated.
    pub fn cooldown(&self, kind: ActionKind) -> Option<Duration> {
        match kind {
            ActionKind::Mine => Some(self.mine_cooldown),
            ActionKind::Spin => Some(self.spin_cooldown),
            ActionKind::Quest => None,
        }
    }

    fn range(&self, kind: ActionKind) -> (i64, i64) {
        match kind {
            ActionKind::Mine => self.mine_reward_range,
            ActionKind::Spin => self.spin_reward_range,
            ActionKind::Quest => self.quest_reward_range,
        }
    }
}

fn parse_range(name: &str, raw: &[i64]) -> Result<(i64, i64), anyhow::Error> {
    match raw {
        [lo, hi] if lo <= hi && *lo >= 0 => Ok((*lo, *hi)),
        [lo, hi] if lo > hi => bail!("{} is inverted: [{}, {}]", name, lo, hi),
        [lo, _] => bail!("{} must not start below zero, got {}", name, lo),
        other => bail!("{} must have exactly two entries, got {}", name, other.len()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooldownStatus {
    Ready,
    Cooling { remaining: Duration },
}

/// An action is accepted iff there is no prior timestamp or the full window
/// has elapsed. Rejections report the wait still left.
pub fn evaluate_cooldown(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> CooldownStatus {
    match last {
        None => CooldownStatus::Ready,
        Some(last) => {
            let elapsed = now - last;
            if elapsed >= window {
                CooldownStatus::Ready
            } else {
                CooldownStatus::Cooling {
                    remaining: window - elapsed,
                }
            }
        }
    }
}

pub struct RewardEngine {
    config: RewardConfig,
    rng: Mutex<StdRng>,
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Self {
        RewardEngine {
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic draws for tests; production uses `new`.
    pub fn with_seed(config: RewardConfig, seed: u64) -> Self {
        RewardEngine {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Uniform draw from the configured inclusive range for this action kind,
    /// in minor units.
    pub fn draw(&self, kind: ActionKind) -> i64 {
        let (lo, hi) = self.config.range(kind);
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.random_range(lo..=hi)
    }
}
