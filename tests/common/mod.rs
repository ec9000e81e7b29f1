//! Shared harness: migrated in-memory database, in-memory blob store, and a
//! scripted vision client so the pipeline runs without any network.
#![allow(dead_code)]

use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use fieldstock_api::config::ImageConfig;
use fieldstock_api::db;
use fieldstock_api::events::{Event, EventSender};
use fieldstock_api::extraction::cache::ExtractionCache;
use fieldstock_api::extraction::image::PreparedImage;
use fieldstock_api::extraction::vision::{VisionClient, VisionError};
use fieldstock_api::services::capture::CaptureService;
use fieldstock_api::services::classifier::CategoryClassifier;
use fieldstock_api::services::invoices::InvoiceService;
use fieldstock_api::services::products::ProductResolver;
use fieldstock_api::services::stock::StockService;
use fieldstock_api::storage::InMemoryBlobStore;

/// Vision double that replays queued responses. An exhausted queue is an
/// `Unavailable` error, which also catches tests that call more than they
/// scripted.
#[derive(Default)]
pub struct ScriptedVision {
    extractions: Mutex<VecDeque<Result<String, VisionError>>>,
    classifications: Mutex<VecDeque<Result<String, VisionError>>>,
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_extraction(&self, response: Result<String, VisionError>) {
        self.extractions.lock().unwrap().push_back(response);
    }

    pub fn push_classification(&self, response: Result<String, VisionError>) {
        self.classifications.lock().unwrap().push_back(response);
    }

    pub fn remaining_extractions(&self) -> usize {
        self.extractions.lock().unwrap().len()
    }
}

#[async_trait]
impl VisionClient for ScriptedVision {
    async fn extract_invoice(&self, _pages: &[PreparedImage]) -> Result<String, VisionError> {
        self.extractions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::Unavailable("no scripted extraction".into())))
    }

    async fn classify(&self, _prompt: &str) -> Result<String, VisionError> {
        self.classifications
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::Unavailable("no scripted classification".into())))
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub store: Arc<InMemoryBlobStore>,
    pub vision: Arc<ScriptedVision>,
    pub capture: Arc<CaptureService>,
    pub invoices: Arc<InvoiceService>,
    pub stock: Arc<StockService>,
    pub resolver: Arc<ProductResolver>,
    pub classifier: Arc<CategoryClassifier>,
    pub events: mpsc::Receiver<Event>,
}

pub async fn spawn_app() -> TestApp {
    // A single connection keeps every query on the same in-memory database.
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).sqlx_logging(false);
    let conn = Database::connect(opts).await.expect("connect sqlite");
    db::run_migrations(&conn).await.expect("run migrations");
    let db = Arc::new(conn);

    let (tx, events) = mpsc::channel(256);
    let event_sender = EventSender::new(tx);

    let store = Arc::new(InMemoryBlobStore::new());
    let vision = Arc::new(ScriptedVision::new());
    let cache = Arc::new(ExtractionCache::new());

    let classifier = Arc::new(CategoryClassifier::new(
        db.clone(),
        vision.clone(),
        event_sender.clone(),
    ));
    let resolver = Arc::new(ProductResolver::new(db.clone(), event_sender.clone()));
    let stock = Arc::new(StockService::new(db.clone(), event_sender.clone()));
    let invoices = Arc::new(InvoiceService::new(
        db.clone(),
        stock.clone(),
        event_sender.clone(),
    ));
    let capture = Arc::new(CaptureService::new(
        db.clone(),
        store.clone(),
        vision.clone(),
        classifier.clone(),
        resolver.clone(),
        cache,
        ImageConfig::default(),
        event_sender,
    ));

    TestApp {
        db,
        store,
        vision,
        capture,
        invoices,
        stock,
        resolver,
        classifier,
        events,
    }
}

/// Tiny valid PNG for capture tests.
pub fn sample_photo(seed: u8) -> bytes::Bytes {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
        Rgb([seed, (x * 16) as u8, (y * 16) as u8])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    bytes::Bytes::from(buf.into_inner())
}
