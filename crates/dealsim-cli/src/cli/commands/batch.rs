use dealsim_core::optimizer::CandidateEvaluator;
use dealsim_core::report::console::render_batch;
use dealsim_core::report::BatchReport;
use tracing::{info, warn};

use super::build::{read_prompt, Runtime};
use crate::cli::args::BatchArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: BatchArgs) -> anyhow::Result<i32> {
    let rt = Runtime::build(&args.common)?;
    let prompt = args.prompt_file.as_deref().map(read_prompt).transpose()?;

    let evaluator = rt.evaluator()?;
    info!(personas = evaluator.persona_count(), "batch evaluation started");
    let evaluation = evaluator.evaluate(prompt.as_deref(), 0).await?;
    let report = BatchReport::new(&evaluation);

    if let Some(writer) = rt.writer() {
        match writer.write_batch(&report) {
            Ok(path) => info!(path = %path.display(), "aggregated report saved"),
            Err(e) => warn!(error = %e, "failed to save aggregated report"),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_batch(&report));
    }
    Ok(SUCCESS)
}
