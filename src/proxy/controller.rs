//! Proxy lifecycle controller
//!
//! Owns one engine slot and walks it through
//! `Idle → Starting → Running → Stopping → Idle`. The slot moves to
//! `Starting` under the lock before any await point, so overlapping start
//! requests can never spawn a second engine; the loser gets
//! [`LifecycleError::StartInProgress`].
//!
//! A start waits for the engine's single terminal event with a timeout. If
//! the caller drops the start future early, `StartingGuard` closes the
//! half-started engine and hands the slot back to `Idle`.

use crate::config::ControllerConfig;
use crate::error::LifecycleError;
use crate::proxy::engine::{
    EngineEvent, EngineEvents, EngineFactory, ProxyConfiguration, ProxyEngine,
};
use crate::rules::{RuleHandle, RuleResolver};
use serde::{Deserialize, Serialize};
use std::net::UdpSocket;
use std::sync::{Arc, Mutex, MutexGuard};

/// Caller overrides merged onto [`ControllerConfig`] for one start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Custom rule to load; unknown identifiers fall back to default behaviour
    pub rule_id: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    /// Address reported back to the caller instead of the detected local IP
    pub address: Option<String>,
    pub web_interface_enabled: Option<bool>,
    pub force_proxy_https: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    /// True when the proxy was already running and nothing was started
    pub already_running: bool,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProxyState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub state: ProxyState,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub rule_id: Option<String>,
}

impl ProxyStatus {
    fn idle(state: ProxyState) -> Self {
        Self {
            state,
            address: None,
            port: None,
            rule_id: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProxyState::Running
    }
}

struct Session {
    engine: Box<dyn ProxyEngine>,
    address: String,
    port: u16,
    rule_id: Option<String>,
}

enum Slot {
    Idle,
    Starting,
    Running(Session),
    Stopping,
}

pub struct ProxyController {
    config: ControllerConfig,
    resolver: RuleResolver,
    factory: Arc<dyn EngineFactory>,
    slot: Mutex<Slot>,
}

impl ProxyController {
    pub fn new(
        config: ControllerConfig,
        resolver: RuleResolver,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            config,
            resolver,
            factory,
            slot: Mutex::new(Slot::Idle),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub async fn start(&self, options: StartOptions) -> Result<StartOutcome, LifecycleError> {
        {
            let mut slot = self.lock_slot();
            match &*slot {
                Slot::Running(session) => {
                    tracing::info!("Proxy already running on port {}", session.port);
                    return Ok(StartOutcome {
                        already_running: true,
                        address: session.address.clone(),
                        port: session.port,
                    });
                }
                Slot::Starting | Slot::Stopping => {
                    tracing::warn!("Start requested while a transition is in flight");
                    return Err(LifecycleError::StartInProgress);
                }
                Slot::Idle => {}
            }
            *slot = Slot::Starting;
        }
        let mut guard = StartingGuard {
            slot: &self.slot,
            engine: None,
        };

        let resolver = self.resolver.clone();
        let rule_id = options.rule_id.clone();
        let rule = tokio::task::spawn_blocking(move || resolver.resolve(rule_id.as_deref()))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!("Rule resolution task failed: {}", err);
                RuleHandle::None
            });

        let configuration = self.build_configuration(&options, rule);
        let rule_id = configuration.rule.id().map(str::to_string);
        tracing::info!(
            "Starting proxy on {}:{} (rule={:?})",
            configuration.bind_host(),
            configuration.port,
            rule_id
        );

        let (events, outcome) = EngineEvents::channel();
        guard
            .engine
            .insert(self.factory.create(configuration))
            .start(events);

        let timeout = self.config.start_timeout();
        let failure = match tokio::time::timeout(timeout, outcome).await {
            // Report the bound port; a configured 0 means "any free port".
            Ok(Ok(EngineEvent::Ready { port })) => {
                let address = options.address.clone().unwrap_or_else(local_ip_address);
                guard.commit(address.clone(), port, rule_id);
                tracing::info!("Proxy started at {}:{}", address, port);
                return Ok(StartOutcome {
                    already_running: false,
                    address,
                    port,
                });
            }
            Ok(Ok(EngineEvent::Error(reason))) => reason,
            Ok(Err(_)) => "engine stopped before reporting readiness".to_string(),
            Err(_) => format!("engine did not become ready within {timeout:?}"),
        };

        tracing::error!("Proxy failed to start: {}", failure);
        // Dropping the guard closes the engine and frees the slot.
        drop(guard);
        Err(LifecycleError::StartFailed(failure))
    }

    /// Close the running engine without waiting for it to acknowledge.
    pub fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        let session = {
            let mut slot = self.lock_slot();
            match std::mem::replace(&mut *slot, Slot::Stopping) {
                Slot::Running(session) => session,
                previous => {
                    let err = match previous {
                        Slot::Idle => LifecycleError::NotRunning,
                        _ => LifecycleError::StartInProgress,
                    };
                    *slot = previous;
                    return Err(err);
                }
            }
        };

        let Session {
            mut engine,
            address,
            port,
            ..
        } = session;
        tracing::info!("Stopping proxy on port {}", port);
        engine.close();
        drop(engine);

        *self.lock_slot() = Slot::Idle;
        Ok(StopOutcome { address, port })
    }

    pub fn status(&self) -> ProxyStatus {
        let slot = self.lock_slot();
        match &*slot {
            Slot::Idle => ProxyStatus::idle(ProxyState::Idle),
            Slot::Starting => ProxyStatus::idle(ProxyState::Starting),
            Slot::Stopping => ProxyStatus::idle(ProxyState::Stopping),
            Slot::Running(session) => ProxyStatus {
                state: ProxyState::Running,
                address: Some(session.address.clone()),
                port: Some(session.port),
                rule_id: session.rule_id.clone(),
            },
        }
    }

    fn build_configuration(&self, options: &StartOptions, rule: RuleHandle) -> ProxyConfiguration {
        ProxyConfiguration {
            rule,
            web_interface_enabled: options
                .web_interface_enabled
                .unwrap_or(self.config.web_interface_enabled),
            port: options.port.unwrap_or(self.config.port),
            force_proxy_https: options
                .force_proxy_https
                .unwrap_or(self.config.force_proxy_https),
            host: options.host.clone().or_else(|| self.config.host.clone()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the slot in `Starting` until the start attempt commits.
struct StartingGuard<'a> {
    slot: &'a Mutex<Slot>,
    engine: Option<Box<dyn ProxyEngine>>,
}

impl StartingGuard<'_> {
    fn commit(&mut self, address: String, port: u16, rule_id: Option<String>) {
        if let Some(engine) = self.engine.take() {
            let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
            *slot = Slot::Running(Session {
                engine,
                address,
                port,
                rule_id,
            });
        }
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(*slot, Slot::Starting) {
            *slot = Slot::Idle;
        }
    }
}

/// Best guess at the LAN address clients should point their proxy settings
/// at. No packet is sent: connecting a UDP socket only selects a route.
pub fn local_ip_address() -> String {
    UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
