pub mod cleanup;
pub mod definition;
pub mod engine;
pub mod error;
pub mod input;
pub mod qa;
pub mod registry;
pub mod scope;
pub mod state;

pub use definition::{
    CompletionHandler, ErrorConfig, ErrorStrategy, Flow, FlowBuilder, FlowCompletion, MessageAction, ProcessResult,
    Prompt, Step, StepAction, StepBuilder,
};
pub use engine::FlowEngine;
pub use error::FlowError;
pub use input::{ButtonClick, FlowInput};
pub use registry::FlowRegistry;
pub use scope::{DataError, FlowScope};
pub use state::{FlowStateStore, UserFlowState};
