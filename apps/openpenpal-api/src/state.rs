//! Shared application state: repositories, cache store, gateway, session
//! keys, and the mutable runtime bits (pause switch, worker registry,
//! materialized leaderboards).

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

use openpenpal_cache::CacheStore;
use openpenpal_config::Settings;
use openpenpal_gateway::{IngressLimiter, RequestPipeline, ServiceRegistry};
use openpenpal_hierarchy::{AssignmentEngine, CourierRoster, Leaderboard};
use openpenpal_letters::ScanProcessor;
use openpenpal_scheduler::Worker;
use openpenpal_store::{
    PgBarcodeRepository, PgCourierRepository, PgExecutionRepository, PgLetterRepository,
    PgOpCodeDirectory, PgScanRecordRepository, PgScheduledTaskRepository, PgTaskRepository,
    PgTaskStore, PgUserRepository,
};

use crate::auth::SessionKeys;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<dyn CacheStore>,

    pub users: Arc<PgUserRepository>,
    pub couriers: Arc<PgCourierRepository>,
    pub courier_tasks: Arc<PgTaskRepository>,
    pub directory: Arc<PgOpCodeDirectory>,
    pub letters: Arc<PgLetterRepository>,
    pub barcodes: Arc<PgBarcodeRepository>,
    pub delivery_tasks: Arc<PgTaskStore>,
    pub scans: Arc<PgScanRecordRepository>,
    pub scheduled_tasks: Arc<PgScheduledTaskRepository>,
    pub executions: Arc<PgExecutionRepository>,

    pub session_keys: SessionKeys,
    pub limiter: Arc<IngressLimiter>,
    pub gateway: Arc<ServiceRegistry>,
    pub pipeline: Arc<RequestPipeline>,

    pub scheduler_paused: Arc<AtomicBool>,
    pub workers: Arc<Mutex<Vec<Worker>>>,
    pub leaderboards: Arc<RwLock<Vec<Leaderboard>>>,
}

impl AppState {
    /// The assignment engine borrows its ports per call; it carries no
    /// state of its own.
    pub fn assignment_engine(&self) -> AssignmentEngine<'_> {
        AssignmentEngine::new(
            self.couriers.as_ref(),
            self.courier_tasks.as_ref(),
            self.directory.as_ref(),
        )
    }

    pub fn roster(&self) -> CourierRoster<'_> {
        CourierRoster::new(self.couriers.as_ref())
    }

    pub fn scan_processor(&self) -> ScanProcessor<'_> {
        ScanProcessor::new(
            self.letters.as_ref(),
            self.barcodes.as_ref(),
            self.delivery_tasks.as_ref(),
            self.scans.as_ref(),
        )
    }
}
