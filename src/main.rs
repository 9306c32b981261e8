use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use relay_transport_service::config::Settings;
use relay_transport_service::domain::LinkPartnerName;
use relay_transport_service::processors::{
    ContentCleanupProcessor, InboundRouterProcessor, ToLinkProcessor,
};
use relay_transport_service::queue::{create_queue_backend, QueueListener};
use relay_transport_service::server::{create_app, AppState};
use relay_transport_service::shutdown::ShutdownSignal;
use relay_transport_service::storage::InMemoryContentStorage;
use relay_transport_service::telemetry::init_tracing;
use relay_transport_service::transform::JsonMessageTransformer;
use relay_transport_service::transport::{
    create_transport_store, HttpDeliveryClient, LinkSubmitService, PushDeliveryDriver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!("Configuration loaded");

    // Create the substrate and the step store
    let queue_backend = create_queue_backend(&settings.queues).await?;
    let transport_store = create_transport_store(&settings.transport).await?;

    // Create application state
    let state = AppState::new(
        settings.clone(),
        queue_backend.clone(),
        transport_store.clone(),
    );
    tracing::info!(
        partners = state.partner_registry.len(),
        "Application state initialized"
    );

    let shutdown = ShutdownSignal::new();

    // Outbound delivery path shared by the to-link listener
    let push_timeout = Duration::from_secs(settings.push.timeout_seconds);
    let delivery_client = Arc::new(HttpDeliveryClient::new(push_timeout)?);
    let push_driver = Arc::new(PushDeliveryDriver::new(
        transport_store.clone(),
        Arc::new(JsonMessageTransformer),
        delivery_client,
        push_timeout,
    ));
    let submit_service = Arc::new(LinkSubmitService::new(
        state.partner_registry.clone(),
        transport_store.clone(),
        push_driver,
    ));

    // One listener per logical queue
    let poll = settings.queues.receive_poll_interval_ms;
    let to_link_listener = QueueListener::new(
        queue_backend.clone(),
        settings.queues.to_link.name.clone(),
        Arc::new(ToLinkProcessor::new(submit_service)),
        poll,
        shutdown.subscribe(),
    );
    let router_processor = InboundRouterProcessor::new(
        queue_backend.clone(),
        settings.queues.to_link.name.clone(),
        settings.router.default_target.as_deref().map(LinkPartnerName::from),
    );
    let to_connector_listener = QueueListener::new(
        queue_backend.clone(),
        settings.queues.to_connector.name.clone(),
        Arc::new(router_processor),
        poll,
        shutdown.subscribe(),
    );
    let content_storage = Arc::new(InMemoryContentStorage::new());
    let cleanup_listener = QueueListener::new(
        queue_backend.clone(),
        settings.queues.to_cleanup.name.clone(),
        Arc::new(ContentCleanupProcessor::new(content_storage)),
        poll,
        shutdown.subscribe(),
    );

    let listener_handles = vec![
        tokio::spawn(to_link_listener.run()),
        tokio::spawn(to_connector_listener.run()),
        tokio::spawn(cleanup_listener.run()),
    ];

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let tcp_listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown.clone()))
        .await?;

    // Wait for the queue listeners to finish
    tracing::info!("Waiting for queue listeners to finish...");
    let _ = futures::future::join_all(listener_handles).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown: ShutdownSignal) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the queue listeners
    shutdown.trigger();
}
