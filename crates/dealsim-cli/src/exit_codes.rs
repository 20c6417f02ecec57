//! Process exit codes. These are part of the CLI contract.

use dealsim_core::SimError;

pub const SUCCESS: i32 = 0;
pub const RUN_FAILED: i32 = 1; // Transport, backend or LLM failure; no persona produced a result
pub const CONFIG_ERROR: i32 = 2; // Invalid config file or arguments

/// Exit code for an error that reached `main`.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SimError>() {
        Some(e) if e.exit_code() == CONFIG_ERROR => CONFIG_ERROR,
        _ => RUN_FAILED,
    }
}
