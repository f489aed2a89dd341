pub mod clock;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use state::StageTimer;
