pub mod time;

pub use time::{now_utc_millis, Clock, ManualClock, SystemClock};
