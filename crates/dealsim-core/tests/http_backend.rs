//! Integration tests for HttpBackend.
//!
//! Uses wiremock for the dealership service: conversation fetch, workflow
//! processing, customer provisioning, prompt storage, status mapping and
//! read retries.

use dealsim_core::backend::http::HttpBackend;
use dealsim_core::backend::{AgentReplyBatch, Backend, PromptMetadata, ProvisionRequest, WorkflowRequest};
use dealsim_core::config::BackendConfig;
use dealsim_core::error::{Service, SimError};
use dealsim_core::model::Turn;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn create_test_backend(mock_server: &MockServer) -> HttpBackend {
    let config = BackendConfig::default().with_base_url(mock_server.uri());
    HttpBackend::new(config).expect("failed to create backend")
}

fn workflow_request() -> WorkflowRequest {
    WorkflowRequest {
        content: "Do you have any trucks?".to_string(),
        customer_id: "cust-1".to_string(),
        conversation_id: "conv-1".to_string(),
        history: vec![Turn::agent("Hi there!"), Turn::customer("Do you have any trucks?")],
        prompt_override: None,
    }
}

#[tokio::test]
async fn test_fetch_conversations_array() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customers/cust-1/conversations"))
        .and(query_param("dealershipId", "4675"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "conv-1",
                "updatedAt": "2025-01-01T00:00:00Z",
                "messages": [
                    {"role": "ASSISTANT", "content": "Welcome!", "createdAt": "2025-01-01T00:00:00Z"}
                ]
            },
            {"id": "conv-0", "messages": []}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let conversations = backend.fetch_conversations("cust-1").await.expect("fetch failed");

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].id.as_deref(), Some("conv-1"));
    assert_eq!(conversations[0].messages[0].content.as_deref(), Some("Welcome!"));
    assert_eq!(conversations[0].messages[0].role.as_deref(), Some("ASSISTANT"));
    assert!(conversations[1].messages.is_empty());
}

#[tokio::test]
async fn test_fetch_conversations_single_object() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customers/cust-2/conversations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "only", "messages": []})),
        )
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let conversations = backend.fetch_conversations("cust-2").await.unwrap();

    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id.as_deref(), Some("only"));
}

#[tokio::test]
async fn test_fetch_conversations_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customers/cust-3/conversations"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    assert!(backend.fetch_conversations("cust-3").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_process_workflow_body_and_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/workflows/process"))
        .and(body_partial_json(json!({
            "content": "Do you have any trucks?",
            "channel": "SMS",
            "customerId": "cust-1",
            "conversationId": "conv-1",
            "metadata": {"dealershipId": "4675", "sendRealResponses": true},
            "conversationHistory": [
                {"role": "EMPLOYEE", "content": "Hi there!"},
                {"role": "CUSTOMER", "content": "Do you have any trucks?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "We have three F-150s in stock.",
            "timestamp": "2025-01-01T00:00:05Z",
            "completed": false,
            "updatedState": {"workflowStep": "DISCOVERY", "conversationId": "conv-9"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let reply = backend.process_workflow(&workflow_request()).await.expect("workflow failed");

    match &reply.batch {
        AgentReplyBatch::Response(fragments) => {
            assert_eq!(fragments.len(), 1);
            assert_eq!(fragments[0].content, "We have three F-150s in stock.");
        }
        other => panic!("expected Response batch, got {other:?}"),
    }
    assert_eq!(reply.workflow_step.as_deref(), Some("DISCOVERY"));
    assert_eq!(reply.conversation_id.as_deref(), Some("conv-9"));
    assert!(!reply.completed);
}

#[tokio::test]
async fn test_process_workflow_prompt_override() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/workflows/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let mut request = workflow_request();
    request.prompt_override = Some("Be brief.".to_string());
    backend.process_workflow(&request).await.unwrap();

    let received = mock_server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["metadata"]["promptOverride"], "Be brief.");
}

#[tokio::test]
async fn test_process_workflow_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/workflows/process"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = BackendConfig::default()
        .with_base_url(mock_server.uri())
        .with_max_retries(3);
    let backend = HttpBackend::new(config).unwrap();
    let result = backend.process_workflow(&workflow_request()).await;

    match result {
        Err(SimError::Status { service, status, body }) => {
            assert_eq!(service, Service::Backend);
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("expected Status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_process_workflow_malformed_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/workflows/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completed": "yes"})))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let result = backend.process_workflow(&workflow_request()).await;

    assert!(matches!(result, Err(SimError::ReplyParse { .. })));
}

#[tokio::test]
async fn test_provision_customer_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/customers/event"))
        .and(body_partial_json(json!({"dealer_id": 4675})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "customerId": "test-123456-000001",
            "conversationId": "conv-new"
        })))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let identity = backend
        .provision_customer(&ProvisionRequest {
            persona_id: "urgent-buyer".to_string(),
            iteration: 0,
        })
        .await
        .expect("provisioning failed");

    assert_eq!(identity.customer_id, "test-123456-000001");
    assert_eq!(identity.conversation_id, "conv-new");
    assert!(identity.display_name.is_some());
}

#[tokio::test]
async fn test_provision_customer_without_conversation_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/customers/event"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let result = backend
        .provision_customer(&ProvisionRequest {
            persona_id: "budget-buyer".to_string(),
            iteration: 1,
        })
        .await;

    match result {
        Err(SimError::Provisioning { persona, message }) => {
            assert_eq!(persona, "budget-buyer");
            assert!(message.contains("conversationId"));
        }
        other => panic!("expected Provisioning error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_provision_customer_http_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/customers/event"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let result = backend
        .provision_customer(&ProvisionRequest {
            persona_id: "urgent-buyer".to_string(),
            iteration: 0,
        })
        .await;

    assert!(matches!(result, Err(SimError::Provisioning { .. })));
}

#[tokio::test]
async fn test_current_prompt_highest_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p1", "version": 1, "promptTemplate": "first"},
            {"id": "p3", "version": 3, "promptTemplate": "third"},
            {"id": "p2", "version": 2, "promptTemplate": "second"}
        ])))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let prompt = backend.current_prompt().await.unwrap();

    assert_eq!(prompt.template, "third");
    assert_eq!(prompt.version, Some(3));
    assert_eq!(prompt.id.as_deref(), Some("p3"));
}

#[tokio::test]
async fn test_current_prompt_separate_prompt_store() {
    let backend_server = MockServer::start().await;
    let prompt_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"promptContent": "from store"})),
        )
        .expect(1)
        .mount(&prompt_server)
        .await;

    let config = BackendConfig::default()
        .with_base_url(backend_server.uri())
        .with_prompt_base_url(prompt_server.uri());
    let backend = HttpBackend::new(config).unwrap();

    assert_eq!(backend.current_prompt().await.unwrap().template, "from store");
}

#[tokio::test]
async fn test_post_prompt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/agents/prompts"))
        .and(body_partial_json(json!({
            "agentName": "customer_discovery",
            "promptTemplate": "Be brief.",
            "metadata": {"iteration": 2, "score": 88.5}
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": 42, "version": 5})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    let stored = backend
        .post_prompt(
            "Be brief.",
            &PromptMetadata {
                iteration: 2,
                score: 88.5,
            },
        )
        .await
        .unwrap();

    assert_eq!(stored.template, "Be brief.");
    assert_eq!(stored.version, Some(5));
    assert_eq!(stored.id.as_deref(), Some("42"));
}

#[tokio::test]
async fn test_reads_retry_on_503() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"promptTemplate": "recovered"})),
        )
        .mount(&mock_server)
        .await;

    let config = BackendConfig::default()
        .with_base_url(mock_server.uri())
        .with_max_retries(2);
    let backend = HttpBackend::new(config).unwrap();

    assert_eq!(backend.current_prompt().await.unwrap().template, "recovered");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reads_give_up_after_max_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = BackendConfig::default()
        .with_base_url(mock_server.uri())
        .with_max_retries(1);
    let backend = HttpBackend::new(config).unwrap();
    let result = backend.current_prompt().await;

    assert!(matches!(
        result,
        Err(SimError::Status { service: Service::PromptStore, status: 502, .. })
    ));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customers/cust-1/conversations"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = BackendConfig::default()
        .with_base_url(mock_server.uri())
        .with_max_retries(3);
    let backend = HttpBackend::new(config).unwrap();
    let err = backend.fetch_conversations("cust-1").await.unwrap_err();

    assert!(err.is_transport());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_user_agent_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/customer_discovery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt": "x"})))
        .mount(&mock_server)
        .await;

    let backend = create_test_backend(&mock_server);
    backend.current_prompt().await.unwrap();

    let received: Vec<Request> = mock_server.received_requests().await.unwrap();
    let agent = received[0].headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(agent.starts_with("dealsim/"));
}
