//! Assembles the run configuration, LLM client and backend from arguments.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dealsim_core::backend::http::HttpBackend;
use dealsim_core::backend::local::LocalBackend;
use dealsim_core::backend::Backend;
use dealsim_core::config::{LlmConfig, SimConfig};
use dealsim_core::judge::{JudgeRuntimeConfig, JudgeService};
use dealsim_core::optimizer::Evaluator;
use dealsim_core::providers::llm::fake::FakeClient;
use dealsim_core::providers::llm::openai::OpenAIClient;
use dealsim_core::providers::llm::tracing::TracingLlmClient;
use dealsim_core::providers::llm::LlmClient;
use dealsim_core::report::ReportWriter;
use dealsim_core::{Orchestrator, SimError};
use tracing::info;

use crate::cli::args::{BackendKind, CommonArgs};

/// Defaults, then the config file, then flags. Not validated yet.
pub(crate) fn load_config(common: &CommonArgs) -> anyhow::Result<SimConfig> {
    let mut cfg = match &common.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };

    if let Some(url) = &common.backend_url {
        cfg.backend.base_url = url.clone();
    }
    if let Some(url) = &common.prompt_url {
        cfg.backend.prompt_base_url = Some(url.clone());
    }
    if let Some(provider) = common.llm {
        cfg.llm.provider = provider.as_str().to_string();
    }
    if let Some(model) = &common.model {
        cfg.llm.model = model.clone();
    }
    if let Some(url) = &common.llm_base_url {
        cfg.llm.base_url = url.clone();
    }
    if let Some(max_turns) = common.max_turns {
        cfg = cfg.with_max_turns(max_turns);
    }
    if let Some(delay) = common.persona_delay_ms {
        cfg = cfg.with_persona_delay_ms(delay);
    }
    if !common.personas.is_empty() {
        cfg.persona_filter = common.personas.clone();
    }
    if common.no_save {
        cfg = cfg.with_output_dir(None);
    } else if let Some(dir) = &common.output_dir {
        cfg = cfg.with_output_dir(Some(dir.clone()));
    }
    Ok(cfg)
}

/// Read a prompt file; surrounding whitespace is dropped.
pub(crate) fn read_prompt(path: &Path) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt {}", path.display()))?;
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(SimError::config(format!("prompt file {} is empty", path.display())).into());
    }
    Ok(prompt.to_string())
}

fn build_llm(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    let inner: Arc<dyn LlmClient> = match cfg.provider.as_str() {
        "fake" => Arc::new(FakeClient::new(cfg.model.clone())),
        "openai" => Arc::new(OpenAIClient::from_env(cfg)?),
        other => {
            return Err(SimError::config(format!("unknown llm provider: {other}")).into());
        }
    };
    Ok(Arc::new(TracingLlmClient::new(inner)))
}

fn build_backend(
    kind: BackendKind,
    cfg: &SimConfig,
    llm: Arc<dyn LlmClient>,
) -> anyhow::Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match kind {
        BackendKind::Http => Arc::new(HttpBackend::new(cfg.backend.clone())?),
        BackendKind::Local => Arc::new(LocalBackend::new(llm, cfg.llm.agent_temperature)),
    };
    Ok(backend)
}

/// Everything a command needs to drive conversations.
pub(crate) struct Runtime {
    pub config: SimConfig,
    pub llm: Arc<dyn LlmClient>,
    pub backend: Arc<dyn Backend>,
}

impl Runtime {
    pub fn build(common: &CommonArgs) -> anyhow::Result<Self> {
        Self::new(load_config(common)?, common.backend)
    }

    pub fn new(config: SimConfig, backend: BackendKind) -> anyhow::Result<Self> {
        config.validate()?;
        let llm = build_llm(&config.llm)?;
        let backend = build_backend(backend, &config, llm.clone())?;
        info!(
            backend = backend.name(),
            llm = llm.provider_name(),
            model = %config.llm.model,
            max_turns = config.conversation.max_turns,
            "runtime ready"
        );
        Ok(Self {
            config,
            llm,
            backend,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.llm.clone(),
            self.backend.clone(),
            self.config.conversation.clone(),
        )
        .with_customer_temperature(self.config.llm.customer_temperature)
    }

    pub fn judge(&self) -> JudgeService {
        JudgeService::new(JudgeRuntimeConfig::from(&self.config.llm), self.llm.clone())
    }

    pub fn writer(&self) -> Option<ReportWriter> {
        self.config.output_dir.clone().map(ReportWriter::new)
    }

    pub fn evaluator(&self) -> anyhow::Result<Evaluator> {
        Ok(
            Evaluator::new(self.orchestrator(), self.judge(), self.config.selected_personas()?)
                .with_persona_delay(Duration::from_millis(self.config.persona_delay_ms))
                .with_writer(self.writer()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dealsim.yaml");
        std::fs::write(
            &path,
            "conversation:\n  max_turns: 6\nllm:\n  model: file-model\noutput_dir: from-file\n",
        )
        .unwrap();

        let common = CommonArgs {
            config: Some(path),
            model: Some("flag-model".to_string()),
            personas: vec!["urgent-buyer".to_string()],
            ..CommonArgs::default()
        };
        let cfg = load_config(&common).unwrap();
        assert_eq!(cfg.conversation.max_turns, 6);
        assert_eq!(cfg.llm.model, "flag-model");
        assert_eq!(cfg.persona_filter, ["urgent-buyer"]);
        assert_eq!(cfg.output_dir, Some(PathBuf::from("from-file")));

        let no_save = CommonArgs {
            no_save: true,
            output_dir: Some(PathBuf::from("ignored")),
            ..CommonArgs::default()
        };
        assert_eq!(load_config(&no_save).unwrap().output_dir, None);
    }

    #[test]
    fn empty_prompt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  \n").unwrap();
        let err = read_prompt(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimError>(),
            Some(SimError::Config { .. })
        ));
    }

    #[test]
    fn local_runtime_with_fake_llm() {
        let common = CommonArgs {
            backend: BackendKind::Local,
            llm: Some(crate::cli::args::LlmProvider::Fake),
            ..CommonArgs::default()
        };
        let rt = Runtime::build(&common).unwrap();
        assert_eq!(rt.backend.name(), "local");
        assert_eq!(rt.llm.provider_name(), "fake");
        assert_eq!(rt.evaluator().unwrap().personas().len(), 3);
    }
}
