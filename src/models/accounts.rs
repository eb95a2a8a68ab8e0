use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub external_id: String,
    pub display_name: String,
    /// Integer minor units; the configured amount precision decides how many
    /// decimal places one unit represents.
    pub balance: i64,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub referral_points: i64,
    pub last_mined: Option<DateTime<Utc>>,
    pub last_spun: Option<DateTime<Utc>>,
    pub last_spin_reward: i64,
    pub quests_completed: Vec<String>,
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub external_id: String,
    pub display_name: String,
    pub referral_code: String,
    pub referred_by: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Mine,
    Spin,
    Quest,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Mine => "mine",
            ActionKind::Spin => "spin",
            ActionKind::Quest => "quest",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    Mine,
    Spin,
    Quest { quest_id: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Mine => ActionKind::Mine,
            Action::Spin => ActionKind::Spin,
            Action::Quest { .. } => ActionKind::Quest,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisterSummary {
    pub external_id: String,
    pub display_name: String,
    pub referral_code: String,
    pub balance: i64,
    pub created: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BalanceInfo {
    pub balance: i64,
    pub referral_code: String,
    pub referral_points: i64,
    pub wallet_address: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub external_id: String,
    pub balance: i64,
}
