//! Application state shared across handlers.

use crate::backend::{HttpBackend, PaymentBackend};
use crate::config::Config;
use crate::recorder::PaymentRecorder;
use marketpay_types::TransactionRequestBuilder;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub struct AppState {
    pub config: Config,
    pub builder: TransactionRequestBuilder,
    pub backend: Arc<dyn PaymentBackend>,
    pub recorder: PaymentRecorder,
    pub start_time: Instant,
    pub request_count: AtomicU64,
    pub ready: AtomicBool,
}

impl AppState {
    /// State backed by the HTTP marketplace backend from `config`.
    pub fn new(config: Config) -> Result<Self, crate::Error> {
        let backend = HttpBackend::new(&config.backend_url, config.backend_timeout())?;
        info!(backend = %backend.base_url(), "Backend client initialized");
        Self::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn PaymentBackend>) -> Result<Self, crate::Error> {
        config.validate()?;
        Ok(Self {
            builder: config.request_builder(),
            recorder: PaymentRecorder::new(Arc::clone(&backend), config.gas_reserve()),
            backend,
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            ready: AtomicBool::new(false),
        })
    }
}
