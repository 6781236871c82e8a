//! Application wiring: options, state, sessions and the run loop

pub mod options;
pub mod run;
pub mod sessions;
pub mod state;
