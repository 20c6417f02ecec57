use dealsim_core::SimConfig;

use crate::cli::args::PersonasArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: PersonasArgs) -> anyhow::Result<i32> {
    let cfg = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    cfg.validate()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cfg.personas)?);
        return Ok(SUCCESS);
    }
    for persona in &cfg.personas {
        println!("{:<20} {}", persona.id, persona.description);
    }
    Ok(SUCCESS)
}
