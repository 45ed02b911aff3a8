//! Administrative control over the query listener
//!
//! [`QueryService`] is what the owning process holds on to. It keeps the
//! configuration the next listener will be built from, so a port change only
//! takes effect on the next reload, and owns at most one running listener.

use crate::config::ListenerConfig;
use crate::error::QueryError;
use crate::handler::DebugFlag;
use crate::host::HostState;
use crate::listener::QueryListener;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct QueryService<H: HostState> {
    config: ListenerConfig,
    host: Arc<H>,
    debug: DebugFlag,
    listener: Option<QueryListener<H>>,
}

impl<H: HostState> QueryService<H> {
    /// Creates a stopped service; call [`QueryService::start`] to bind.
    pub fn new(config: ListenerConfig, host: Arc<H>, debug: bool) -> Self {
        Self {
            config,
            host,
            debug: DebugFlag::new(debug),
            listener: None,
        }
    }

    /// Binds the configured address unless a listener is already running.
    pub async fn start(&mut self) -> Result<SocketAddr, QueryError> {
        if let Some(listener) = self.listener.as_ref().filter(|l| l.is_running()) {
            return Ok(listener.local_addr());
        }
        self.reload().await
    }

    /// Closes the listening socket if there is one.
    pub async fn stop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop().await;
        }
    }

    /// Replaces the current listener with one built from the current
    /// configuration. On failure the service is left stopped.
    pub async fn reload(&mut self) -> Result<SocketAddr, QueryError> {
        let config = self.config.clone();
        let started = match self.listener.take() {
            Some(listener) => listener.reload(config).await,
            None => {
                QueryListener::start(config, Arc::clone(&self.host), self.debug.clone()).await
            }
        };

        let listener = started?;
        let addr = listener.local_addr();
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Changes the port used by the next reload.
    pub fn set_port(&mut self, port: u16) {
        self.config.port = port;
    }

    /// The port the next reload will bind.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Address of the running listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .filter(|l| l.is_running())
            .map(QueryListener::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Flips debug logging for the listener and every live handler.
    pub fn toggle_debug(&self) -> bool {
        self.debug.toggle()
    }

    pub fn is_debugging(&self) -> bool {
        self.debug.is_enabled()
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }
}
