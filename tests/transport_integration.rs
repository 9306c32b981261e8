//! Cross-component integration tests for the queue substrate, the listeners
//! and the recovery console, wired together the same way the binary wires
//! them, against the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use relay_transport_service::config::QueuePairConfig;
use relay_transport_service::domain::{
    ConnectorMessageId, LinkMode, LinkPartner, LinkPartnerName, Message, TransportState,
    TransportUpdate,
};
use relay_transport_service::partner::LinkPartnerRegistry;
use relay_transport_service::processors::ToLinkProcessor;
use relay_transport_service::queue::memory_backend::MemoryQueueBackend;
use relay_transport_service::queue::{
    DlqConsole, MessageProcessor, ProcessingError, QueueBackend, QueueListener,
};
use relay_transport_service::shutdown::ShutdownSignal;
use relay_transport_service::transform::{JsonMessageTransformer, TransportAck, WireMessage};
use relay_transport_service::transport::{
    DeliveryClientError, DeliveryEndpointClient, LinkSubmitService, MemoryTransportStepStore,
    PushDeliveryDriver, TransportStepStore, TransportStoreError,
};

struct AlwaysFailingProcessor;

#[async_trait]
impl MessageProcessor for AlwaysFailingProcessor {
    async fn process(&self, _message: &Message) -> Result<(), ProcessingError> {
        Err(ProcessingError::new("processor rejects everything"))
    }
}

struct RefusingDeliveryClient;

#[async_trait]
impl DeliveryEndpointClient for RefusingDeliveryClient {
    async fn deliver(
        &self,
        _partner: &LinkPartner,
        _message: &WireMessage,
    ) -> Result<TransportAck, DeliveryClientError> {
        Ok(TransportAck {
            result: false,
            message_id: None,
            result_message: Some("partner unreachable".to_string()),
        })
    }
}

fn cleanup_backend(max_redeliveries: u32) -> Arc<MemoryQueueBackend> {
    Arc::new(MemoryQueueBackend::new(
        &[QueuePairConfig::new("to-cleanup"), QueuePairConfig::new("to-link")],
        max_redeliveries,
    ))
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// A poisoned message on the cleanup queue ends up on the cleanup DLQ after
/// its redelivery budget, and the origin queue is left empty.
#[tokio::test]
async fn test_failing_cleanup_message_dead_letters_after_budget() {
    let max_redeliveries = 3;
    let backend = cleanup_backend(max_redeliveries);
    let shutdown = ShutdownSignal::new();

    let message = Message::new(ConnectorMessageId::from("asdfasdfasdf"));
    backend.enqueue("to-cleanup", message).await.unwrap();

    let listener = QueueListener::new(
        backend.clone(),
        "to-cleanup",
        Arc::new(AlwaysFailingProcessor),
        10,
        shutdown.subscribe(),
    );
    let handle = tokio::spawn(listener.run());

    let backend_probe = backend.clone();
    wait_for(move || {
        let backend = backend_probe.clone();
        async move { !backend.browse_dlq("to-cleanup").await.unwrap().is_empty() }
    })
    .await;

    shutdown.trigger();
    handle.await.unwrap();

    let dlq = backend.browse_dlq("to-cleanup").await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].message.id.as_str(), "asdfasdfasdf");
    assert_eq!(dlq[0].redelivery_count, max_redeliveries);
    assert!(backend.browse("to-cleanup").await.unwrap().is_empty());
}

/// Terminal steps reject any further transition and keep their stored state.
#[tokio::test]
async fn test_terminal_transport_steps_are_immutable() {
    let store = MemoryTransportStepStore::new();
    let message = Message::new(ConnectorMessageId::from("msg-1"));
    let partner = LinkPartnerName::from("gateway");

    let step = store.create_step(&message, &partner).await.unwrap();
    store
        .update_status(
            &step.transport_id,
            TransportUpdate::to_state(TransportState::Accepted)
                .with_remote_message_id("remote-1"),
        )
        .await
        .unwrap();

    for next in [
        TransportState::Pending,
        TransportState::PendingDownloaded,
        TransportState::Accepted,
        TransportState::Failed,
    ] {
        let result = store
            .update_status(&step.transport_id, TransportUpdate::to_state(next))
            .await;
        assert!(matches!(
            result,
            Err(TransportStoreError::AlreadyTerminal { .. })
        ));
    }

    let stored = store.get_step(&step.transport_id).await.unwrap().unwrap();
    assert_eq!(stored.state, TransportState::Accepted);
    assert_eq!(stored.remote_message_id.as_deref(), Some("remote-1"));
}

/// Console repair semantics: deleting an absent message succeeds without
/// side effects; a moved message shows up only on the origin queue.
#[tokio::test]
async fn test_console_delete_is_idempotent_and_move_restores() {
    let backend = cleanup_backend(0);
    let console = DlqConsole::new(backend.clone(), "to-cleanup");

    let id = backend
        .enqueue("to-cleanup", Message::new(ConnectorMessageId::from("msg-1")))
        .await
        .unwrap();

    // delete it, then delete it again
    console.delete_msg(id).await.unwrap();
    console.delete_msg(id).await.unwrap();
    assert!(console.list_all_messages().await.unwrap().is_empty());
    assert!(console.list_all_messages_in_dlq().await.unwrap().is_empty());

    // dead-letter a second message, then move it back
    let id = backend
        .enqueue("to-cleanup", Message::new(ConnectorMessageId::from("msg-2")))
        .await
        .unwrap();
    let delivery = backend.receive("to-cleanup").await.unwrap().unwrap();
    backend.rollback(delivery).await.unwrap();
    assert_eq!(console.list_all_messages_in_dlq().await.unwrap().len(), 1);

    assert!(console.move_msg_from_dlq_to_queue(id).await.unwrap());
    assert_eq!(console.list_all_messages().await.unwrap().len(), 1);
    assert!(console.list_all_messages_in_dlq().await.unwrap().is_empty());
}

/// End-to-end push failure handling: every redelivery of the queued message
/// produces a fresh terminal FAILED transport attempt, and once the budget
/// is exhausted the message parks on the to-link DLQ for operators.
#[tokio::test]
async fn test_failed_push_accumulates_attempts_then_dead_letters() {
    let max_redeliveries = 2;
    let backend = cleanup_backend(max_redeliveries);
    let store: Arc<MemoryTransportStepStore> = Arc::new(MemoryTransportStepStore::new());
    let shutdown = ShutdownSignal::new();

    let partner = LinkPartner {
        name: LinkPartnerName::from("gateway"),
        certificate_dn: "CN=Gateway".to_string(),
        mode: LinkMode::Push,
        push_url: Some("http://gateway.example/deliver".to_string()),
    };
    let registry = Arc::new(LinkPartnerRegistry::from_partners(&[partner]));

    let push_driver = Arc::new(PushDeliveryDriver::new(
        store.clone(),
        Arc::new(JsonMessageTransformer),
        Arc::new(RefusingDeliveryClient),
        Duration::from_secs(1),
    ));
    let submit = Arc::new(LinkSubmitService::new(registry, store.clone(), push_driver));

    let message = Message::new(ConnectorMessageId::from("msg-1"))
        .with_target(LinkPartnerName::from("gateway"));
    backend.enqueue("to-link", message).await.unwrap();

    let listener = QueueListener::new(
        backend.clone(),
        "to-link",
        Arc::new(ToLinkProcessor::new(submit)),
        10,
        shutdown.subscribe(),
    );
    let handle = tokio::spawn(listener.run());

    let backend_probe = backend.clone();
    wait_for(move || {
        let backend = backend_probe.clone();
        async move { !backend.browse_dlq("to-link").await.unwrap().is_empty() }
    })
    .await;

    shutdown.trigger();
    handle.await.unwrap();

    // initial delivery + max_redeliveries, one FAILED attempt each
    let attempts = store
        .find_by_connector_message_id(&ConnectorMessageId::from("msg-1"))
        .await
        .unwrap();
    assert_eq!(attempts.len(), (max_redeliveries as usize) + 1);
    assert!(attempts
        .iter()
        .all(|step| step.state == TransportState::Failed));
    assert_eq!(
        attempts.last().unwrap().attempt,
        max_redeliveries + 1
    );
    assert!(attempts
        .iter()
        .all(|step| step.result_text.as_deref().unwrap_or("").contains("partner unreachable")));
}
