//! Voice pipeline state machine

mod events;
mod orchestrator;
mod state;

pub use events::PipelineEvent;
pub use orchestrator::{Pipeline, PipelineComponents, PipelineHandle};
pub use state::PipelineState;
