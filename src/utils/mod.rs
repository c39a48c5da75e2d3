//! Shared utilities: decimal parsing, normalization, clocks and timers.

pub mod clock;
pub mod decimal;
pub mod normalize;
pub mod schedule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use normalize::{annualize_apr, format_price, strip_quote, FundingInterval};
