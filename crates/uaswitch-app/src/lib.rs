//! UA Switch application layer
//!
//! Wires the settings store, the rule engine and an in-process rule host into
//! the background service and the manager operations the CLI exposes.

pub mod background;
pub mod ipc;
pub mod manager;
pub mod transfer;

use std::sync::Arc;
use tracing::info;
use uaswitch_core::{AppConfig, UaResult};
use uaswitch_rules::MemoryRuleHost;
use uaswitch_store::SettingsStore;

pub use background::{Background, InstallReason, LifecycleEvent};
pub use ipc::{Message, Response};
pub use manager::{Manager, StatusKind, StatusMessage, UserAgentListing};
pub use transfer::ExportDocument;

/// Everything one process needs, built from an [`AppConfig`]
pub struct App {
    pub config: AppConfig,
    pub store: Arc<SettingsStore>,
    pub host: Arc<MemoryRuleHost>,
    pub background: Arc<Background>,
    pub manager: Manager,
}

impl App {
    pub fn open(config: AppConfig) -> UaResult<Self> {
        let store = Arc::new(SettingsStore::open(&config)?);
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<SettingsStore>) -> Self {
        let host = Arc::new(MemoryRuleHost::with_limit(config.max_rules));
        let background = Arc::new(Background::new(Arc::clone(&store), host.clone()));
        let manager = Manager::new(Arc::clone(&background));

        Self {
            config,
            store,
            host,
            background,
            manager,
        }
    }

    /// Deliver the lifecycle event for this launch: install on an empty store,
    /// startup otherwise
    pub fn start(&self) -> UaResult<LifecycleEvent> {
        let event = if self.store.get_all()?.is_empty() {
            LifecycleEvent::Installed {
                reason: InstallReason::Install,
            }
        } else {
            LifecycleEvent::Startup
        };

        self.background.handle_event(event)?;
        info!("Installed {} rules", self.host.len());
        Ok(event)
    }
}
