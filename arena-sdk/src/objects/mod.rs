pub mod events;
pub mod ladder;
pub mod leaderboard;
pub mod queue;
pub mod wallet;

pub use events::{
    BusEvent, EnvelopeError, EventEnvelope, EventKind, LeaderboardUpdatedPayload,
    MatchCompletedPayload, PlayerMatchStats, QueueJoinedPayload, RawEnvelope,
    RewardSettledPayload, SpawnRequestedPayload,
};
pub use ladder::{Ladder, LeaderboardPeriod, MatchOutcome};
pub use leaderboard::{StandingResponse, StandingsResponse};
pub use queue::{
    JoinQueueRequest, LeaveQueueRequest, LeaveQueueResponse, TicketResponse, TicketStatus,
};
pub use wallet::{LedgerEntryResponse, LedgerEntryType, WalletResponse};
