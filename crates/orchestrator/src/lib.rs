//! The request gate, citation & safety gate, response formatter,
//! streaming adapter, and the orchestration state machine that drives a
//! query from raw text to a delivered or blocked response.

pub mod formatter;
pub mod gate;
pub mod orchestrator;
pub mod safety;
pub mod streaming;

pub use formatter::ResponseFormatter;
pub use gate::RequestGate;
pub use orchestrator::Orchestrator;
pub use safety::{CritiqueSignal, SafetyGate};
pub use streaming::StreamingAdapter;
