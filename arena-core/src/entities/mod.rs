pub mod leaderboard_entry;
pub mod match_history;
pub mod queue_ticket;
pub mod wallet;

use arena_sdk::objects::{
    Ladder as SdkLadder, LeaderboardPeriod as SdkLeaderboardPeriod,
    MatchOutcome as SdkMatchOutcome,
};

/// Ladder for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `arena_sdk::objects::Ladder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "ladder")]
pub enum Ladder {
    #[sqlx(rename = "5v5")]
    FiveVersusFive,
    #[sqlx(rename = "1v1")]
    OneVersusOne,
}

impl std::fmt::Display for Ladder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkLadder::from(*self).fmt(f)
    }
}

impl From<Ladder> for SdkLadder {
    fn from(value: Ladder) -> Self {
        match value {
            Ladder::FiveVersusFive => SdkLadder::FiveVersusFive,
            Ladder::OneVersusOne => SdkLadder::OneVersusOne,
        }
    }
}

impl From<SdkLadder> for Ladder {
    fn from(value: SdkLadder) -> Self {
        match value {
            SdkLadder::FiveVersusFive => Ladder::FiveVersusFive,
            SdkLadder::OneVersusOne => Ladder::OneVersusOne,
        }
    }
}

/// Per-player match result for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `arena_sdk::objects::MatchOutcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "match_outcome")]
pub enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

impl From<MatchOutcome> for SdkMatchOutcome {
    fn from(value: MatchOutcome) -> Self {
        match value {
            MatchOutcome::Win => SdkMatchOutcome::Win,
            MatchOutcome::Loss => SdkMatchOutcome::Loss,
            MatchOutcome::Draw => SdkMatchOutcome::Draw,
        }
    }
}

impl From<SdkMatchOutcome> for MatchOutcome {
    fn from(value: SdkMatchOutcome) -> Self {
        match value {
            SdkMatchOutcome::Win => MatchOutcome::Win,
            SdkMatchOutcome::Loss => MatchOutcome::Loss,
            SdkMatchOutcome::Draw => MatchOutcome::Draw,
        }
    }
}

/// Leaderboard period for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `arena_sdk::objects::LeaderboardPeriod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "leaderboard_period")]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl LeaderboardPeriod {
    pub const ALL: [LeaderboardPeriod; 3] = [
        LeaderboardPeriod::Daily,
        LeaderboardPeriod::Weekly,
        LeaderboardPeriod::Monthly,
    ];
}

impl From<LeaderboardPeriod> for SdkLeaderboardPeriod {
    fn from(value: LeaderboardPeriod) -> Self {
        match value {
            LeaderboardPeriod::Daily => SdkLeaderboardPeriod::Daily,
            LeaderboardPeriod::Weekly => SdkLeaderboardPeriod::Weekly,
            LeaderboardPeriod::Monthly => SdkLeaderboardPeriod::Monthly,
        }
    }
}

impl From<SdkLeaderboardPeriod> for LeaderboardPeriod {
    fn from(value: SdkLeaderboardPeriod) -> Self {
        match value {
            SdkLeaderboardPeriod::Daily => LeaderboardPeriod::Daily,
            SdkLeaderboardPeriod::Weekly => LeaderboardPeriod::Weekly,
            SdkLeaderboardPeriod::Monthly => LeaderboardPeriod::Monthly,
        }
    }
}
