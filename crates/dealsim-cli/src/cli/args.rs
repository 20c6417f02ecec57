use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "dealsim",
    version,
    about = "Simulated customers, rubric judging and prompt optimization for a dealership sales agent"
)]
pub struct Cli {
    /// Log line format (logs are written to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "DEALSIM_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Debug logging; RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one persona against the agent and score the conversation
    Converse(ConverseArgs),
    /// Evaluate one prompt across the persona set
    Batch(BatchArgs),
    /// Rewrite the agent prompt from judge feedback until the target score
    Optimize(OptimizeArgs),
    /// Score a saved judge evaluation offline
    Score(ScoreArgs),
    /// List the persona catalogue
    Personas(PersonasArgs),
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Deployed dealership backend over HTTP
    #[default]
    Http,
    /// In-process agent answered by the LLM provider
    Local,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Openai,
    /// Deterministic offline responses (dry runs, CI)
    Fake,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Fake => "fake",
        }
    }
}

/// Flags shared by every command that talks to the agent.
#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    /// YAML config file; flags below override its values
    #[arg(long, env = "DEALSIM_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendKind::Http, env = "DEALSIM_BACKEND")]
    pub backend: BackendKind,

    /// Dealership backend base URL
    #[arg(long, env = "DEALSIM_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Prompt storage base URL (defaults to the backend URL)
    #[arg(long, env = "DEALSIM_PROMPT_URL")]
    pub prompt_url: Option<String>,

    #[arg(long, value_enum, env = "DEALSIM_LLM")]
    pub llm: Option<LlmProvider>,

    /// Model identifier, e.g. gpt-4o-mini
    #[arg(long, env = "DEALSIM_MODEL")]
    pub model: Option<String>,

    /// OpenAI-compatible API root
    #[arg(long, env = "DEALSIM_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Turn ceiling per conversation, both speakers counted
    #[arg(long, env = "DEALSIM_MAX_TURNS")]
    pub max_turns: Option<usize>,

    /// Pause between persona evaluations
    #[arg(long, env = "DEALSIM_PERSONA_DELAY_MS")]
    pub persona_delay_ms: Option<u64>,

    /// Persona id to run (repeatable); default is every persona
    #[arg(long = "persona", value_name = "ID")]
    pub personas: Vec<String>,

    /// Directory for conversation and run records
    #[arg(long, env = "DEALSIM_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not write any records
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ConverseArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Reuse an existing customer instead of provisioning one
    #[arg(long, requires = "conversation_id")]
    pub customer_id: Option<String>,

    #[arg(long, requires = "customer_id")]
    pub conversation_id: Option<String>,

    /// Agent prompt sent as the override for this conversation
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Print the conversation record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Agent prompt to evaluate; without it the backend's own prompt answers
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Print the aggregated report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Mutation rounds after the initial evaluation
    #[arg(long, env = "DEALSIM_MAX_ITERATIONS")]
    pub max_iterations: Option<usize>,

    /// Stop once the best average score reaches this value (0-100)
    #[arg(long, env = "DEALSIM_TARGET_SCORE")]
    pub target_score: Option<f64>,

    /// Start from this prompt instead of the stored one
    #[arg(long)]
    pub initial_prompt_file: Option<PathBuf>,

    /// Print the run record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ScoreArgs {
    /// Raw judge evaluation JSON
    #[arg(long, short)]
    pub input: PathBuf,

    /// Print a table instead of JSON
    #[arg(long)]
    pub text: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PersonasArgs {
    #[arg(long, env = "DEALSIM_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub json: bool,
}
