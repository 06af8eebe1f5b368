use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Competitive ladders a player can queue for.
pub enum Ladder {
    #[serde(rename = "5v5")]
    FiveVersusFive,
    #[serde(rename = "1v1")]
    OneVersusOne,
}

impl std::fmt::Display for Ladder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ladder::FiveVersusFive => write!(f, "5v5"),
            Ladder::OneVersusOne => write!(f, "1v1"),
        }
    }
}

impl std::str::FromStr for Ladder {
    type Err = UnknownLadder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5v5" => Ok(Ladder::FiveVersusFive),
            "1v1" => Ok(Ladder::OneVersusOne),
            other => Err(UnknownLadder(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ladder: {0}")]
pub struct UnknownLadder(pub String);

/// Result of a single player in a completed match.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `arena-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

/// Ranked leaderboard window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for LeaderboardPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaderboardPeriod::Daily => write!(f, "daily"),
            LeaderboardPeriod::Weekly => write!(f, "weekly"),
            LeaderboardPeriod::Monthly => write!(f, "monthly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_wire_names() {
        assert_eq!(
            serde_json::to_string(&Ladder::FiveVersusFive).unwrap(),
            "\"5v5\""
        );
        let ladder: Ladder = serde_json::from_str("\"1v1\"").unwrap();
        assert_eq!(ladder, Ladder::OneVersusOne);
        assert_eq!("5v5".parse::<Ladder>().unwrap(), Ladder::FiveVersusFive);
        assert!("2v2".parse::<Ladder>().is_err());
    }

    #[test]
    fn test_outcome_is_lowercase() {
        let outcome: MatchOutcome = serde_json::from_str("\"draw\"").unwrap();
        assert_eq!(outcome, MatchOutcome::Draw);
        assert!(serde_json::from_str::<MatchOutcome>("\"Win\"").is_err());
    }
}
