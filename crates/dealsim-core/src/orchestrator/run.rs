use std::sync::Arc;

use tracing::{debug, info, warn};

use super::customer::{next_customer_turn, strip_agent_label};
use super::state::{transition, DialogueState, Event};
use super::{ConversationOutcome, Exchange, ScoredConversation};
use crate::backend::{Backend, RemoteMessage, WorkflowRequest};
use crate::config::{ConversationConfig, SyncMode};
use crate::error::{SimError, SimResult};
use crate::judge::JudgeService;
use crate::model::{CustomerIdentity, Persona, Speaker, TerminationReason, Transcript, Turn};
use crate::providers::llm::LlmClient;

const AGENT_ROLES: &[&str] = &["ASSISTANT", "EMPLOYEE", "AGENT", "AI"];
const CUSTOMER_ROLES: &[&str] = &["USER", "CUSTOMER", "HUMAN"];

#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    backend: Arc<dyn Backend>,
    config: ConversationConfig,
    customer_temperature: f32,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, backend: Arc<dyn Backend>, config: ConversationConfig) -> Self {
        Self {
            llm,
            backend,
            config,
            customer_temperature: 0.7,
        }
    }

    pub fn with_customer_temperature(mut self, temperature: f32) -> Self {
        self.customer_temperature = temperature;
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Run one conversation to termination.
    ///
    /// `prompt` is sent with every workflow call as the salesperson prompt
    /// override. The returned transcript holds at most `max_turns` turns.
    pub async fn run_conversation(
        &self,
        persona: &Persona,
        identity: CustomerIdentity,
        prompt: Option<&str>,
        max_turns: usize,
    ) -> SimResult<ConversationOutcome> {
        let mut state = DialogueState::Sync;
        let mut transcript = Transcript::new();
        let mut identity = identity;
        let mut exchanges = Vec::new();

        info!(
            persona = %persona.id,
            customer = %identity.customer_id,
            conversation = %identity.conversation_id,
            max_turns,
            "conversation started"
        );

        loop {
            let event = match state {
                DialogueState::Sync => {
                    self.sync(&mut transcript, &identity, max_turns).await?;
                    Event::Synced {
                        turns: transcript.len(),
                    }
                }
                DialogueState::CustomerTurn => {
                    let text = next_customer_turn(
                        self.llm.as_ref(),
                        persona,
                        &transcript,
                        &self.config.default_greeting,
                        self.customer_temperature,
                    )
                    .await?;
                    debug!(persona = %persona.id, turn = transcript.len() + 1, "customer: {text}");
                    transcript.push(Turn::customer(text));
                    Event::CustomerSpoke {
                        turns: transcript.len(),
                    }
                }
                DialogueState::AgentTurn => {
                    let exchange = self
                        .agent_turn(&mut transcript, &mut identity, prompt, max_turns)
                        .await?;
                    let completed = exchange.completed;
                    if self.config.record_exchanges {
                        exchanges.push(exchange);
                    }
                    Event::AgentReplied {
                        turns: transcript.len(),
                        completed,
                    }
                }
                DialogueState::Judge(reason) => {
                    transcript.finish(reason);
                    info!(
                        persona = %persona.id,
                        turns = transcript.len(),
                        reason = ?reason,
                        "conversation finished"
                    );
                    return Ok(ConversationOutcome {
                        transcript,
                        identity,
                        exchanges,
                    });
                }
                DialogueState::End => {
                    return Err(SimError::InvalidTransition {
                        state: state.to_string(),
                        event: "run".to_string(),
                    })
                }
            };
            state = transition(state, event, max_turns)?;
        }
    }

    /// Run a conversation and score it with `judge`.
    pub async fn run_scored(
        &self,
        judge: &JudgeService,
        persona: &Persona,
        identity: CustomerIdentity,
        prompt: Option<&str>,
        max_turns: usize,
    ) -> SimResult<ScoredConversation> {
        let outcome = self
            .run_conversation(persona, identity, prompt, max_turns)
            .await?;
        let reason = outcome
            .transcript
            .termination_reason
            .unwrap_or(TerminationReason::MaxTurns);

        let judge = judge.score(&outcome.transcript).await?;
        transition(DialogueState::Judge(reason), Event::Scored, max_turns)?;
        info!(persona = %persona.id, score = judge.overall_score, "conversation scored");

        Ok(ScoredConversation {
            persona: persona.clone(),
            outcome,
            judge,
        })
    }

    /// Pull remote history into an empty transcript without duplicating lines.
    async fn sync(
        &self,
        transcript: &mut Transcript,
        identity: &CustomerIdentity,
        max_turns: usize,
    ) -> SimResult<()> {
        if !transcript.is_empty() || self.config.sync_mode == SyncMode::Off {
            return Ok(());
        }

        let conversations = self.backend.fetch_conversations(&identity.customer_id).await?;
        let Some(conversation) = conversations
            .iter()
            .find(|c| c.id.as_deref() == Some(identity.conversation_id.as_str()))
            .or_else(|| conversations.first())
        else {
            debug!(customer = %identity.customer_id, "no remote conversation to sync");
            return Ok(());
        };

        let candidates: Vec<Turn> = match self.config.sync_mode {
            SyncMode::Greeting => conversation
                .messages
                .iter()
                .filter_map(|m| m.content.as_deref())
                .map(str::trim)
                .find(|c| !c.is_empty())
                .map(|c| vec![Turn::agent(c)])
                .unwrap_or_default(),
            SyncMode::Full => conversation.messages.iter().filter_map(remote_turn).collect(),
            SyncMode::Off => Vec::new(),
        };

        let mut added = 0;
        for turn in candidates {
            if transcript.len() >= max_turns {
                break;
            }
            if transcript.contains_line(&turn.line()) {
                continue;
            }
            transcript.push(turn);
            added += 1;
        }
        debug!(customer = %identity.customer_id, added, "synced remote history");
        Ok(())
    }

    async fn agent_turn(
        &self,
        transcript: &mut Transcript,
        identity: &mut CustomerIdentity,
        prompt: Option<&str>,
        max_turns: usize,
    ) -> SimResult<Exchange> {
        let customer_turn = transcript.len();
        let content = transcript
            .last_by(Speaker::Customer)
            .map(|t| t.text.clone())
            .unwrap_or_default();

        let request = WorkflowRequest {
            content: content.clone(),
            customer_id: identity.customer_id.clone(),
            conversation_id: identity.conversation_id.clone(),
            history: transcript.turns().to_vec(),
            prompt_override: prompt.map(str::to_string),
        };
        let reply = self.backend.process_workflow(&request).await?;

        let fragments = reply.batch.fragments();
        if fragments.is_empty() {
            warn!(
                conversation = %identity.conversation_id,
                "workflow returned no agent text, recording an empty agent turn"
            );
            transcript.push(Turn::agent(""));
        } else {
            for (i, fragment) in fragments.iter().enumerate() {
                if transcript.len() >= max_turns {
                    debug!(dropped = fragments.len() - i, "turn ceiling reached mid-reply");
                    break;
                }
                transcript.push(
                    Turn::agent(strip_agent_label(&fragment.content))
                        .with_timestamp(fragment.timestamp.clone()),
                );
            }
        }

        let mut conversation_changed = false;
        if let Some(moved) = reply
            .conversation_id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != identity.conversation_id)
        {
            info!(from = %identity.conversation_id, to = %moved, "backend moved the conversation");
            identity.conversation_id = moved.to_string();
            conversation_changed = true;
        }

        let completed = reply.completed
            || reply
                .workflow_step
                .as_deref()
                .is_some_and(|step| self.config.is_sentinel(step));

        Ok(Exchange {
            turn: customer_turn,
            customer: content,
            source: reply.batch.source(),
            fragments: fragments.iter().map(|f| f.content.clone()).collect(),
            workflow_step: reply.workflow_step.clone(),
            completed,
            conversation_id: identity.conversation_id.clone(),
            conversation_changed,
        })
    }
}

fn remote_turn(message: &RemoteMessage) -> Option<Turn> {
    let content = message.content.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
    let role = message.role.as_deref()?.to_ascii_uppercase();
    let turn = if AGENT_ROLES.contains(&role.as_str()) {
        Turn::agent(content)
    } else if CUSTOMER_ROLES.contains(&role.as_str()) {
        Turn::customer(content)
    } else {
        return None;
    };
    Some(turn.with_timestamp(message.created_at.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{text_reply, ScriptedBackend};
    use crate::backend::{AgentReply, AgentReplyBatch, RemoteConversation, ReplyFragment};
    use crate::judge::JudgeRuntimeConfig;
    use crate::providers::llm::fake::{FakeClient, ScriptedClient};
    use crate::providers::llm::Purpose;

    fn identity() -> CustomerIdentity {
        CustomerIdentity {
            customer_id: "cust-1".to_string(),
            conversation_id: "conv-1".to_string(),
            display_name: None,
        }
    }

    fn persona() -> Persona {
        Persona::new("budget-conscious", "Tight budget, wants value.")
    }

    fn config(sync_mode: SyncMode) -> ConversationConfig {
        ConversationConfig {
            sync_mode,
            ..ConversationConfig::default()
        }
    }

    fn message(role: &str, content: &str) -> RemoteMessage {
        RemoteMessage {
            role: Some(role.to_string()),
            content: Some(content.to_string()),
            created_at: None,
        }
    }

    fn customers(lines: &[&'static str]) -> Arc<ScriptedClient> {
        Arc::new(ScriptedClient::new().with(Purpose::CustomerTurn, lines.iter().copied()))
    }

    #[tokio::test]
    async fn runs_exactly_to_the_ceiling_without_sentinel() {
        let llm = customers(&["hi", "budget is 15k", "ok thanks"]);
        let backend = Arc::new(ScriptedBackend::new());
        let orch = Orchestrator::new(llm, backend.clone(), config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 6)
            .await
            .unwrap();

        assert_eq!(out.transcript.len(), 6);
        assert!(!out.transcript.completed);
        assert_eq!(out.transcript.termination_reason, Some(TerminationReason::MaxTurns));
        let speakers: Vec<_> = out.transcript.turns().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            [
                Speaker::Customer,
                Speaker::Agent,
                Speaker::Customer,
                Speaker::Agent,
                Speaker::Customer,
                Speaker::Agent
            ]
        );
        assert_eq!(backend.workflow_requests().len(), 3);
        assert_eq!(out.exchanges.len(), 3);
    }

    #[tokio::test]
    async fn sentinel_step_stops_early() {
        let llm = customers(&["hi", "sounds good"]);
        let mut done = text_reply("See you Saturday!");
        done.workflow_step = Some("completed".to_string());
        let backend = Arc::new(ScriptedBackend::new().with_replies([text_reply("Hello!"), done]));
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 20)
            .await
            .unwrap();

        assert_eq!(out.transcript.len(), 4);
        assert!(out.transcript.completed);
        assert_eq!(
            out.transcript.termination_reason,
            Some(TerminationReason::BackendCompleted)
        );
        assert!(out.exchanges[1].completed);
    }

    #[tokio::test]
    async fn completed_flag_stops_early() {
        let llm = customers(&["hi"]);
        let mut done = text_reply("Transferring you now.");
        done.completed = true;
        let backend = Arc::new(ScriptedBackend::new().with_replies([done]));
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 20)
            .await
            .unwrap();
        assert_eq!(out.transcript.len(), 2);
        assert!(out.transcript.completed);
    }

    #[tokio::test]
    async fn greeting_sync_seeds_the_matching_conversation() {
        let llm = customers(&["hey"]);
        let backend = Arc::new(ScriptedBackend::new().with_conversations(vec![
            RemoteConversation {
                id: Some("other".to_string()),
                messages: vec![message("ASSISTANT", "Wrong greeting")],
                ..Default::default()
            },
            RemoteConversation {
                id: Some("conv-1".to_string()),
                messages: vec![
                    message("ASSISTANT", "Hi! Looking for a car?"),
                    message("USER", "maybe"),
                ],
                ..Default::default()
            },
        ]));
        let orch = Orchestrator::new(llm.clone(), backend, config(SyncMode::Greeting));

        let out = orch
            .run_conversation(&persona(), identity(), None, 3)
            .await
            .unwrap();

        let turns = out.transcript.turns();
        assert_eq!(turns[0], Turn::agent("Hi! Looking for a car?"));
        assert_eq!(turns[1], Turn::customer("hey"));
        assert_eq!(turns.len(), 3);
        assert!(llm.requests_for(Purpose::CustomerTurn)[0]
            .content_of(crate::providers::llm::Role::User)
            .contains("Agent just said:\nHi! Looking for a car?"));
    }

    #[tokio::test]
    async fn full_sync_skips_duplicate_lines() {
        let llm = customers(&["what about trucks"]);
        let backend = Arc::new(ScriptedBackend::new().with_conversations(vec![RemoteConversation {
            id: Some("conv-1".to_string()),
            messages: vec![
                message("ASSISTANT", "Hi there"),
                message("CUSTOMER", "hello"),
                message("assistant", "Hi there"),
                message("SYSTEM", "internal note"),
            ],
            ..Default::default()
        }]));
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Full));

        let out = orch
            .run_conversation(&persona(), identity(), None, 4)
            .await
            .unwrap();

        let lines: Vec<_> = out.transcript.turns().iter().map(Turn::line).collect();
        assert_eq!(
            lines,
            [
                "AGENT: Hi there",
                "CUSTOMER: hello",
                "CUSTOMER: what about trucks",
                "AGENT: Noted."
            ]
        );
    }

    #[tokio::test]
    async fn customer_labels_are_stripped() {
        let llm = customers(&["Customer: do you have hybrids?"]);
        let orch = Orchestrator::new(llm, Arc::new(ScriptedBackend::new()), config(SyncMode::Off));
        let out = orch
            .run_conversation(&persona(), identity(), None, 2)
            .await
            .unwrap();
        assert_eq!(out.transcript.turns()[0].text, "do you have hybrids?");
    }

    #[tokio::test]
    async fn adopts_conversation_id_from_backend() {
        let llm = customers(&["hi", "and financing?"]);
        let mut moved = text_reply("Hello!");
        moved.conversation_id = Some("conv-2".to_string());
        let backend = Arc::new(ScriptedBackend::new().with_replies([moved]));
        let orch = Orchestrator::new(llm, backend.clone(), config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 4)
            .await
            .unwrap();

        let sent = backend.workflow_requests();
        assert_eq!(sent[0].conversation_id, "conv-1");
        assert_eq!(sent[1].conversation_id, "conv-2");
        assert_eq!(out.identity.conversation_id, "conv-2");
        assert!(out.exchanges[0].conversation_changed);
        assert!(!out.exchanges[1].conversation_changed);
    }

    #[tokio::test]
    async fn multi_fragment_reply_is_cut_at_the_ceiling() {
        let llm = customers(&["hi"]);
        let frag = |s: &str| ReplyFragment {
            content: s.to_string(),
            timestamp: None,
        };
        let reply = AgentReply::from_fragments(AgentReplyBatch::History(vec![
            frag("one"),
            frag("two"),
            frag("three"),
            frag("four"),
        ]));
        let backend = Arc::new(ScriptedBackend::new().with_replies([reply]));
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 3)
            .await
            .unwrap();
        let texts: Vec<_> = out.transcript.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["hi", "one", "two"]);
        assert_eq!(out.exchanges[0].fragments.len(), 4);
    }

    #[tokio::test]
    async fn leaked_agent_labels_are_stripped_from_the_transcript() {
        let llm = customers(&["hi"]);
        let backend = Arc::new(
            ScriptedBackend::new().with_replies([text_reply("Assistant: We have two SUVs.")]),
        );
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 2)
            .await
            .unwrap();
        assert_eq!(out.transcript.turns()[1], Turn::agent("We have two SUVs."));
        assert_eq!(out.exchanges[0].fragments, ["Assistant: We have two SUVs."]);
    }

    #[tokio::test]
    async fn empty_reply_records_an_empty_agent_turn() {
        let llm = customers(&["hi", "hello?"]);
        let backend = Arc::new(
            ScriptedBackend::new().with_replies([AgentReply::from_fragments(AgentReplyBatch::Empty)]),
        );
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let out = orch
            .run_conversation(&persona(), identity(), None, 3)
            .await
            .unwrap();
        assert_eq!(out.transcript.turns()[1], Turn::agent(""));
        assert_eq!(out.transcript.len(), 3);
    }

    #[tokio::test]
    async fn workflow_gets_prompt_override_and_history() {
        let llm = customers(&["hi"]);
        let backend = Arc::new(ScriptedBackend::new());
        let orch = Orchestrator::new(llm, backend.clone(), config(SyncMode::Off));

        orch.run_conversation(&persona(), identity(), Some("be brief"), 2)
            .await
            .unwrap();

        let sent = &backend.workflow_requests()[0];
        assert_eq!(sent.prompt_override.as_deref(), Some("be brief"));
        assert_eq!(sent.content, "hi");
        assert_eq!(sent.history, vec![Turn::customer("hi")]);
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let llm = customers(&["hi"]);
        let backend = Arc::new(ScriptedBackend::new().failing_workflow());
        let orch = Orchestrator::new(llm, backend, config(SyncMode::Off));

        let err = orch
            .run_conversation(&persona(), identity(), None, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn scored_run_reaches_the_judge() {
        let llm: Arc<dyn LlmClient> = Arc::new(FakeClient::new("fake"));
        let orch = Orchestrator::new(llm.clone(), Arc::new(ScriptedBackend::new()), config(SyncMode::Off));
        let judge = JudgeService::new(JudgeRuntimeConfig::default(), llm);

        let scored = orch
            .run_scored(&judge, &persona(), identity(), None, 4)
            .await
            .unwrap();
        assert_eq!(scored.outcome.transcript.len(), 4);
        assert_eq!(scored.judge.overall_score, 95.0);
        assert_eq!(scored.persona.id, "budget-conscious");
    }
}
