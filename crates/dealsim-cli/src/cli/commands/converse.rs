use dealsim_core::backend::ProvisionRequest;
use dealsim_core::optimizer::PersonaResult;
use dealsim_core::report::console::{render_judge, render_transcript};
use dealsim_core::report::json::conversation_record;
use dealsim_core::{CustomerIdentity, SimError};
use tracing::{info, warn};

use super::build::{read_prompt, Runtime};
use crate::cli::args::ConverseArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: ConverseArgs) -> anyhow::Result<i32> {
    let rt = Runtime::build(&args.common)?;
    let persona = match rt.config.selected_personas()?.as_slice() {
        [one] => one.clone(),
        _ => {
            return Err(SimError::config("converse takes exactly one --persona").into());
        }
    };
    let prompt = args.prompt_file.as_deref().map(read_prompt).transpose()?;

    let identity = match (args.customer_id, args.conversation_id) {
        (Some(customer_id), Some(conversation_id)) => CustomerIdentity {
            customer_id,
            conversation_id,
            display_name: None,
        },
        _ => {
            rt.backend
                .provision_customer(&ProvisionRequest {
                    persona_id: persona.id.clone(),
                    iteration: 0,
                })
                .await?
        }
    };

    let scored = rt
        .orchestrator()
        .run_scored(
            &rt.judge(),
            &persona,
            identity,
            prompt.as_deref(),
            rt.config.conversation.max_turns,
        )
        .await?;
    let result = PersonaResult::from_scored(scored);

    if let Some(writer) = rt.writer() {
        match writer.write_conversation(&result) {
            Ok(path) => info!(path = %path.display(), "conversation saved"),
            Err(e) => warn!(error = %e, "failed to save conversation"),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&conversation_record(&result))?);
    } else {
        print!("{}", render_transcript(&result.transcript));
        print!("{}", render_judge(&result.judge));
    }
    Ok(SUCCESS)
}
