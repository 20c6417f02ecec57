use super::args::*;

pub mod batch;
pub(crate) mod build;
pub mod converse;
pub mod optimize;
pub mod personas;
pub mod score;

use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Converse(args) => converse::run(args).await,
        Command::Batch(args) => batch::run(args).await,
        Command::Optimize(args) => optimize::run(args).await,
        Command::Score(args) => score::run(args),
        Command::Personas(args) => personas::run(args),
        Command::Version => {
            println!("dealsim {}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
