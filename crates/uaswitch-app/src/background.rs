//! Background service: lifecycle handling, control messages and the
//! storage-change trigger that keeps installed rules current

use crate::ipc::{Message, Response};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uaswitch_core::{SettingKey, UaResult, Update};
use uaswitch_rules::{resolve_active, RuleEngine, RuleHost};
use uaswitch_store::{ChangeSet, SettingsStore, Subscription};

/// Why the service was (re)installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    /// First-ever installation
    Install,
    /// New version over an existing one
    Update,
}

/// Host lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Installed { reason: InstallReason },
    Startup,
}

pub struct Background {
    store: Arc<SettingsStore>,
    engine: RuleEngine,
    changes: Mutex<Receiver<Vec<String>>>,
    _subscription: Subscription,
}

impl Background {
    /// Create the service and subscribe it to store changes
    pub fn new(store: Arc<SettingsStore>, host: Arc<dyn RuleHost>) -> Self {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let subscription = store.on_change(move |changes: &ChangeSet| {
            let keys: Vec<String> = changes.keys().map(str::to_string).collect();
            let tx = tx.lock().unwrap_or_else(|e| e.into_inner());
            // A closed receiver means the service is gone; nothing left to trigger
            let _ = tx.send(keys);
        });

        let engine = RuleEngine::new(Arc::clone(&store), host);

        Self {
            store,
            engine,
            changes: Mutex::new(rx),
            _subscription: subscription,
        }
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// React to install, update or browser startup
    pub fn handle_event(&self, event: LifecycleEvent) -> UaResult<()> {
        info!("Lifecycle event: {:?}", event);

        if let LifecycleEvent::Installed {
            reason: InstallReason::Install,
        } = event
        {
            if self.store.seed_defaults()? {
                info!("Storage initialized with defaults");
            }
            self.engine.mark_seeded();
        } else if self
            .store
            .get(&[SettingKey::Enabled])?
            .contains(SettingKey::Enabled)
        {
            // Seeded by an earlier run
            self.engine.mark_seeded();
        }

        let count = self.engine.resync()?;
        info!("Startup resync installed {} rules", count);
        Ok(())
    }

    /// Handle a control message; failures are reported in the response
    pub fn handle_message(&self, message: Message) -> Response {
        info!("Message received: {}", message.action());

        match message {
            Message::ApplyUserAgent {
                ua_key,
                user_agent,
                domain_rules,
            } => {
                let result = self
                    .store
                    .set(Update::new().active_ua(&ua_key).enabled(true))
                    .and_then(|()| self.engine.apply(&ua_key, &user_agent, &domain_rules));

                match result {
                    Ok(_) => {
                        info!("User-Agent applied: {}", ua_key);
                        Response::ok()
                    }
                    Err(e) => {
                        warn!("Failed to apply User-Agent {}: {}", ua_key, e);
                        Response::error(e.to_string())
                    }
                }
            }
            Message::Disable => self.engine.disable().into(),
            Message::Enable => self.engine.resync().map(|_| ()).into(),
            Message::GetCurrentUa => match self.current_user_agent() {
                Ok(user_agent) => Response::user_agent(user_agent),
                Err(e) => Response::error(e.to_string()),
            },
        }
    }

    /// Handle one JSON-encoded message
    pub fn handle_json(&self, text: &str) -> Response {
        match Message::from_json(text) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                warn!("Rejected message: {}", e);
                Response::error(e.to_string())
            }
        }
    }

    /// The User-Agent the global rule carries for the stored settings
    pub fn current_user_agent(&self) -> UaResult<String> {
        let snapshot = self.store.get(&[
            SettingKey::ActiveUa,
            SettingKey::UserAgents,
            SettingKey::CustomUserAgents,
        ])?;
        Ok(resolve_active(&snapshot))
    }

    /// Drain queued store changes and resync once if any of them feeds the rules
    ///
    /// Returns whether a resync ran.
    pub fn pump_changes(&self) -> UaResult<bool> {
        let mut relevant = false;
        {
            let changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                match changes.try_recv() {
                    Ok(keys) => {
                        debug!("Storage changed: {:?}", keys);
                        relevant |= keys.iter().any(|k| SettingKey::triggers_resync(k));
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }

        if !relevant {
            return Ok(false);
        }

        info!("Rule inputs changed, reloading rules");
        self.engine.resync()?;
        Ok(true)
    }
}
