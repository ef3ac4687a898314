//! Contestation workflow engine.
//!
//! A fixed linear pipeline with one conditional skip:
//!
//! ```text
//! START -> POPULATE_QUEUE -> (RESOLVE_DETAIL -> GATE -> [GENERATE -> SUBMIT] -> ADVANCE)* -> DONE
//! ```

mod gate;
mod state;
mod workflow;

pub use gate::should_generate_defense;
pub use state::{EngineState, RunState};
pub use workflow::WorkflowEngine;
