// Core encoding engine - independent of the command line front end

pub mod core;
pub mod error;
pub mod probe;
pub mod tools;
pub mod worker;

pub use core::*;
pub use error::EncodeError;
pub use probe::{FfprobeProbe, MediaProbe};
pub use tools::{HttpToolSource, ToolBinaryState, ToolProvisioner, ToolSource};
pub use worker::{
    EncoderSource, FileFailure, Orchestrator, ProcessRegistry, RunSummary, ShutdownHandle,
    WorkerMessage,
};
