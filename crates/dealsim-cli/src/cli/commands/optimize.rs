use dealsim_core::optimizer::{resolve_initial_prompt, Optimizer, PromptMutator};
use dealsim_core::report::console::render_optimization;

use super::build::{load_config, read_prompt, Runtime};
use crate::cli::args::OptimizeArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: OptimizeArgs) -> anyhow::Result<i32> {
    let mut config = load_config(&args.common)?;
    if let Some(n) = args.max_iterations {
        config.optimizer.max_iterations = n;
    }
    if let Some(target) = args.target_score {
        config.optimizer.target_score = target;
    }
    let rt = Runtime::new(config, args.common.backend)?;

    let initial = match &args.initial_prompt_file {
        Some(path) => read_prompt(path)?,
        None => resolve_initial_prompt(rt.backend.as_ref()).await,
    };

    let mutator = PromptMutator::new(rt.llm.clone(), rt.config.llm.mutator_temperature);
    let optimizer = Optimizer::new(
        Box::new(rt.evaluator()?),
        Box::new(mutator),
        rt.backend.clone(),
        rt.config.optimizer.clone(),
    )
    .with_writer(rt.writer());

    let run = optimizer.run(&initial).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print!("{}", render_optimization(&run));
    }
    Ok(SUCCESS)
}
