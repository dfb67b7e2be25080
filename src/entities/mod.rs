pub mod batches;
pub mod event_logs;
pub mod prizes;
pub mod reservations;
pub mod tokens;

pub use batches as batch_entity;
pub use event_logs as event_log_entity;
pub use prizes as prize_entity;
pub use prizes::PrizeKind;
pub use reservations as reservation_entity;
pub use tokens as token_entity;
pub use tokens::TokenState;
