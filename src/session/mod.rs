pub mod machine;
pub mod state;

pub use machine::{Advance, Collaborators, SessionStateMachine, MAX_RATING, MIN_RATING};
pub use state::{
    ExerciseSession, SessionContext, SessionSnapshot, SessionStatus, TerminalRecord, TriggerEntry,
    TriggerInput,
};
