//! Engine contract
//!
//! The controller never drives traffic itself. It builds a
//! [`ProxyConfiguration`], asks an [`EngineFactory`] for an engine, and waits
//! for that engine to report `ready` or `error` through the single-use
//! [`EngineEvents`] sink it was started with.

use crate::rules::RuleHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Configuration handed to an engine for one session.
#[derive(Debug, Clone)]
pub struct ProxyConfiguration {
    pub rule: RuleHandle,
    pub web_interface_enabled: bool,
    pub port: u16,
    pub force_proxy_https: bool,
    /// Bind host; `None` binds every interface
    pub host: Option<String>,
}

impl ProxyConfiguration {
    pub fn bind_host(&self) -> &str {
        self.host.as_deref().unwrap_or("0.0.0.0")
    }
}

/// Terminal outcome of an engine start attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Listening; `port` is the port actually bound
    Ready { port: u16 },
    Error(String),
}

/// Single-use sink for an engine's start outcome.
///
/// Both methods consume the sink, so an engine can report at most one
/// terminal event per start. Dropping it unsent tells the controller the
/// engine went away.
#[derive(Debug)]
pub struct EngineEvents {
    tx: oneshot::Sender<EngineEvent>,
}

impl EngineEvents {
    pub fn channel() -> (Self, oneshot::Receiver<EngineEvent>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn ready(self, port: u16) {
        let _ = self.tx.send(EngineEvent::Ready { port });
    }

    pub fn error(self, reason: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::Error(reason.into()));
    }
}

pub trait ProxyEngine: Send {
    /// Begin listening. Exactly one of `events.ready(..)` / `events.error(..)`
    /// must follow, possibly from another task.
    fn start(&mut self, events: EngineEvents);

    /// Request shutdown. Does not wait for the engine to finish.
    fn close(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, config: ProxyConfiguration) -> Box<dyn ProxyEngine>;
}

/// Engine that owns the listening socket and its accept loop.
///
/// Connections are accepted and closed; the interception pipeline plugs in
/// behind this lifecycle and is not part of this crate.
pub struct ListenerEngine {
    config: ProxyConfiguration,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerEngine {
    pub fn new(config: ProxyConfiguration) -> Self {
        Self {
            config,
            shutdown: None,
            task: None,
        }
    }
}

impl ProxyEngine for ListenerEngine {
    fn start(&mut self, events: EngineEvents) {
        let addr = format!("{}:{}", self.config.bind_host(), self.config.port);
        let rule_id = self.config.rule.id().map(str::to_string);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let listener = match TcpListener::bind(&addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("Failed to bind proxy listener on {}: {}", addr, err);
                    events.error(format!("failed to bind {addr}: {err}"));
                    return;
                }
            };
            let port = match listener.local_addr() {
                Ok(local) => local.port(),
                Err(err) => {
                    events.error(format!("failed to read bound address: {err}"));
                    return;
                }
            };
            tracing::info!("Proxy engine listening on {} (port {}, rule={:?})", addr, port, rule_id);
            events.ready(port);
            run_accept_loop(listener, shutdown_rx).await;
            tracing::info!("Proxy engine on {} stopped", addr);
        });

        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
    }

    fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        // Fire-and-forget: the accept loop exits on its own once signalled.
        self.task.take();
    }
}

impl Drop for ListenerEngine {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_accept_loop(listener: TcpListener, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, peer_addr)) => {
                        tracing::debug!("Connection from {}", peer_addr);
                        drop(socket);
                    }
                    Err(err) => tracing::error!("Accept error: {}", err),
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ListenerEngineFactory;

impl EngineFactory for ListenerEngineFactory {
    fn create(&self, config: ProxyConfiguration) -> Box<dyn ProxyEngine> {
        Box::new(ListenerEngine::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_on(port: u16) -> ProxyConfiguration {
        ProxyConfiguration {
            rule: RuleHandle::None,
            web_interface_enabled: false,
            port,
            force_proxy_https: true,
            host: Some("127.0.0.1".to_string()),
        }
    }

    #[tokio::test]
    async fn reports_bound_port_then_releases_it_on_close() {
        let mut engine = ListenerEngine::new(config_on(0));
        let (events, rx) = EngineEvents::channel();
        engine.start(events);
        let port = match rx.await.unwrap() {
            EngineEvent::Ready { port } => port,
            other => panic!("unexpected event {other:?}"),
        };
        assert_ne!(port, 0);
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_err());

        engine.close();
        engine.close();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "port {port} still bound after close"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn reports_error_when_port_is_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut engine = ListenerEngine::new(config_on(port));
        let (events, rx) = EngineEvents::channel();
        engine.start(events);
        assert!(matches!(rx.await.unwrap(), EngineEvent::Error(_)));
    }

    #[test]
    fn bind_host_defaults_to_all_interfaces() {
        let mut config = config_on(8001);
        config.host = None;
        assert_eq!(config.bind_host(), "0.0.0.0");
    }
}
