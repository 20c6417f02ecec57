use anyhow::Context;
use dealsim_core::report::console::render_judge;
use dealsim_core::JudgeService;

use crate::cli::args::ScoreArgs;
use crate::exit_codes::SUCCESS;

/// Score a raw judge evaluation without calling any service.
pub fn run(args: ScoreArgs) -> anyhow::Result<i32> {
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let output = JudgeService::score_raw_text(&raw)?;

    if args.text {
        print!("{}", render_judge(&output));
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(SUCCESS)
}
