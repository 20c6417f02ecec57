//! DealSim core: simulated customers talk to a dealership salesperson agent,
//! a rubric judge scores each conversation, and an optimization loop rewrites
//! the salesperson prompt from the judge's feedback.

pub mod backend;
pub mod config;
pub mod error;
pub mod judge;
pub mod model;
pub mod optimizer;
pub mod orchestrator;
pub mod personas;
pub mod providers;
pub mod report;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use judge::{JudgeOutput, JudgeService};
pub use model::{CustomerIdentity, Persona, Speaker, TerminationReason, Transcript, Turn};
pub use orchestrator::Orchestrator;
