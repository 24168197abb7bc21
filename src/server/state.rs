use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::broadcast::Broadcaster;
use crate::config::Settings;
use crate::detector::{create_detector, CodeDetector, DetectorError};
use crate::lifecycle::LifecycleCoordinator;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub detector: Arc<dyn CodeDetector>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire up the hub. Must run inside a Tokio runtime; the coordinator
    /// spawns the notifier worker pool, which listens on `shutdown`.
    pub fn new(
        settings: Settings,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<Self, DetectorError> {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            registry,
            broadcaster,
            settings.hub.notice_queue,
            settings.hub.notifier_workers,
            shutdown,
        ));
        let detector = create_detector(&settings.detector)?;

        Ok(Self {
            settings: Arc::new(settings),
            coordinator,
            detector,
            started_at: Instant::now(),
        })
    }
}
