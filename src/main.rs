use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use fieldstock_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Build the capture pipeline and its collaborators
    let store: Arc<dyn api::storage::BlobStore> =
        Arc::new(api::storage::LocalBlobStore::new(cfg.blob_root.clone()));
    let vision: Arc<dyn api::extraction::vision::VisionClient> = Arc::new(
        api::extraction::vision::HttpVisionClient::new(cfg.vision.clone())
            .map_err(|e| format!("vision client init: {}", e))?,
    );
    let cache = Arc::new(api::extraction::cache::ExtractionCache::new());

    let classifier = Arc::new(api::services::classifier::CategoryClassifier::new(
        db.clone(),
        vision.clone(),
        event_sender.clone(),
    ));
    let resolver = Arc::new(api::services::products::ProductResolver::new(
        db.clone(),
        event_sender.clone(),
    ));
    let stock = Arc::new(api::services::stock::StockService::new(
        db.clone(),
        event_sender.clone(),
    ));
    let invoices = Arc::new(api::services::invoices::InvoiceService::new(
        db.clone(),
        stock.clone(),
        event_sender.clone(),
    ));
    let capture = Arc::new(api::services::capture::CaptureService::new(
        db.clone(),
        store,
        vision,
        classifier,
        resolver,
        cache,
        cfg.image.clone(),
        event_sender.clone(),
    ));

    let services = api::handlers::AppServices {
        capture,
        invoices,
        stock,
    };

    let app_state = api::AppState {
        db: db.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

    let cors_layer = if cfg.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    // Build router: status/health + full v1 API + Swagger UI
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "fieldstock-api up" }))
        .route("/health", get(api::health_check))
        .route("/status", get(api::app_status))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            // Capture waits on the vision call plus its retries.
            cfg.vision.timeout_secs * (cfg.vision.max_retries as u64 + 1) + 30,
        )))
        .layer(cors_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("fieldstock-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
