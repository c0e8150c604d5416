use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::Tier;
use crate::janitor::{Janitor, run_janitor};
use crate::rate_limit::{Admission, run_evictor};
use crate::service::ConversionService;

// app's shared state
pub struct AppState {
    pub settings: Settings,
    pub service: ConversionService,
    pub admission: Admission,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let service = ConversionService::new(&settings);
        let admission = Admission::new(settings.api_tier, settings.convert_tier, settings.client_idle);
        Self {
            settings,
            service,
            admission,
        }
    }

    /// Start the janitor and both client evictors.
    pub fn start_background(&self) -> BackgroundTasks {
        let janitor = Janitor::new(&self.settings.workspace_root, self.settings.janitor_max_age);
        let every = self.settings.eviction_interval;

        BackgroundTasks {
            handles: vec![
                tokio::spawn(run_janitor(janitor, self.settings.janitor_interval)),
                tokio::spawn(run_evictor(Arc::clone(&self.admission.api), Tier::Api, every)),
                tokio::spawn(run_evictor(
                    Arc::clone(&self.admission.convert),
                    Tier::Convert,
                    every,
                )),
            ],
        }
    }
}

/// Process-lifetime loops, stopped at shutdown.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        tracing::info!("Background tasks stopped");
    }
}
