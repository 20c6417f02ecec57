//! Prompt optimization loop.
//!
//! Evaluate a prompt across the personas, turn the judge results into
//! feedback, ask the LLM for a revised prompt, evaluate it, and repeat until
//! the target score or the iteration limit is reached.

pub mod evaluate;
pub mod feedback;
pub mod mutate;
mod run;

pub use evaluate::{CandidateEvaluator, Evaluation, Evaluator, PersonaFailure, PersonaResult};
pub use feedback::build_feedback;
pub use mutate::{PromptMutator, PromptProposer};
pub use run::{
    resolve_initial_prompt, OptimizationIteration, OptimizationRun, Optimizer, PersonaJudgement,
    StopReason,
};
