//! Query listener owning the bound TCP socket
//!
//! A [`QueryListener`] binds once, at construction, and runs its accept loop
//! on a background task until stopped. Each accepted connection is handed to
//! its own handler task, so a slow client never holds up accepting. Reloading
//! builds a new listener from a new [`ListenerConfig`].

use crate::config::ListenerConfig;
use crate::error::QueryError;
use crate::handler::{handle_connection, DebugFlag, HandlerSettings};
use crate::host::HostState;
use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

/// Pending connection queue length, same as tokio's `TcpListener::bind`
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a transient accept failure before accepting again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Source of incoming connections for the accept loop.
trait Accept: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(Self::Stream, SocketAddr)>>;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::poll_accept(self, cx)
    }
}

/// A running (or stopped) query listener.
pub struct QueryListener<H: HostState> {
    config: ListenerConfig,
    local_addr: SocketAddr,
    host: Arc<H>,
    debug: DebugFlag,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<H: HostState> QueryListener<H> {
    /// Binds the configured address and starts accepting.
    ///
    /// Bind failures are logged and returned; nothing is left running.
    pub async fn start(
        config: ListenerConfig,
        host: Arc<H>,
        debug: DebugFlag,
    ) -> Result<Self, QueryError> {
        let listener = match bind(&config).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Couldn't start Minequery: {}", e);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;
        info!("Minequery listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        // The field is public, so the builder's bounds may have been skipped
        let permits = config.max_connections.clamp(1, Semaphore::MAX_PERMITS);
        let task = tokio::spawn(accept_loop(
            listener,
            local_addr,
            shutdown_rx,
            Arc::clone(&host),
            config.handler_settings(),
            debug.clone(),
            Arc::new(Semaphore::new(permits)),
        ));

        Ok(Self {
            config,
            local_addr,
            host,
            debug,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address actually bound; differs from the config when port 0 was used.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// True while the accept loop is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Closes the listening socket. In-flight handlers are left to finish.
    ///
    /// Returns once the socket is released. Stopping twice is a no-op.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already have exited on a fatal accept error
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Minequery accept loop panicked: {}", e);
            }
        }
    }

    /// Stops this listener and starts a fresh one from `config`.
    ///
    /// On failure the old socket is already closed and nothing replaces it.
    pub async fn reload(mut self, config: ListenerConfig) -> Result<Self, QueryError> {
        self.stop().await;
        let host = Arc::clone(&self.host);
        let debug = self.debug.clone();
        QueryListener::start(config, host, debug).await
    }
}

/// Binds the first usable candidate address. A port conflict ends the
/// search; other failures (no IPv6 support, say) move on to the next one.
async fn bind(config: &ListenerConfig) -> Result<TcpListener, QueryError> {
    let mut failure = None;

    for addr in config.bind_address.resolve(config.port).await? {
        match bind_socket(addr) {
            Ok(listener) => return Ok(listener),
            Err(source) if source.kind() == io::ErrorKind::AddrInUse => {
                return Err(QueryError::Bind { addr, source });
            }
            Err(source) => {
                debug!("Couldn't bind {}: {}", addr, source);
                failure = Some(QueryError::Bind { addr, source });
            }
        }
    }

    Err(failure.unwrap_or_else(|| QueryError::InvalidAddress {
        addr: format!("{}:{}", config.bind_address, config.port),
        source: io::Error::new(io::ErrorKind::NotFound, "no address to bind"),
    }))
}

/// Builds the listening socket by hand so the IPv6 wildcard can be made
/// dual-stack regardless of the system's `bindv6only` default.
fn bind_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() && addr.ip().is_unspecified() {
        socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let listener: std::net::TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

/// Accepts until `shutdown` fires (or its sender is dropped) or the socket
/// fails for good. Dropping the listener at the end closes the socket.
async fn accept_loop<A: Accept, H: HostState>(
    listener: A,
    local_addr: SocketAddr,
    mut shutdown: oneshot::Receiver<()>,
    host: Arc<H>,
    settings: HandlerSettings,
    debug: DebugFlag,
    limiter: Arc<Semaphore>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            accepted = poll_fn(|cx| listener.poll_accept(cx)) => match accepted {
                Ok((stream, peer)) => {
                    let Ok(permit) = Arc::clone(&limiter).try_acquire_owned() else {
                        warn!("Connection limit reached, rejecting connection from {}", peer);
                        continue;
                    };

                    let host = Arc::clone(&host);
                    let debug = debug.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, host, settings, debug).await;
                        drop(permit);
                    });
                }
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(e) => {
                    error!("Minequery listener failed, no longer accepting: {}", e);
                    break;
                }
            },
        }
    }

    drop(listener);
    info!("Minequery listener on {} closed", local_addr);
}

/// Accept failures that only concern one pending connection or a passing
/// resource shortage (e.g. descriptor exhaustion). Anything else means the
/// listening socket itself is unusable.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::InvalidInput
            | io::ErrorKind::NotConnected
            | io::ErrorKind::Unsupported
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindAddress;
    use crate::host::InMemoryHost;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpStream;

    fn local_config() -> ListenerConfig {
        ListenerConfig::new(BindAddress::Host("127.0.0.1".to_string()), 0)
            .with_read_timeout(Duration::from_secs(2))
    }

    fn test_host() -> Arc<InMemoryHost> {
        Arc::new(InMemoryHost::new(25565, 20).with_players(["Alice"]))
    }

    async fn send(addr: SocketAddr, line: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(line).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_transient_accept_errors() {
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionAborted
        )));
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::Interrupted
        )));
        // EMFILE surfaces as an uncategorised OS error
        assert!(is_transient_accept_error(&io::Error::from_raw_os_error(24)));

        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::InvalidInput
        )));
        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::NotConnected
        )));
    }

    #[tokio::test]
    async fn test_start_and_answer() {
        let listener = QueryListener::start(local_config(), test_host(), DebugFlag::new(false))
            .await
            .unwrap();

        assert!(listener.is_running());
        assert_ne!(listener.local_addr().port(), 0);

        let response = send(listener.local_addr(), b"QUERY\n").await;
        assert_eq!(
            response,
            "SERVERPORT 25565\nPLAYERCOUNT 1\nMAXPLAYERS 20\nPLAYERLIST [Alice]\n"
        );
    }

    #[tokio::test]
    async fn test_stop_releases_socket_and_is_idempotent() {
        let mut listener =
            QueryListener::start(local_config(), test_host(), DebugFlag::new(false))
                .await
                .unwrap();
        let addr = listener.local_addr();

        listener.stop().await;
        assert!(!listener.is_running());
        listener.stop().await;

        assert!(TcpStream::connect(addr).await.is_err());

        // The port is free again
        let rebound = QueryListener::start(
            local_config().with_port(addr.port()),
            test_host(),
            DebugFlag::new(false),
        )
        .await
        .unwrap();
        assert_eq!(rebound.local_addr(), addr);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = QueryListener::start(
            local_config().with_port(port),
            test_host(),
            DebugFlag::new(false),
        )
        .await;

        match result {
            Err(e) => assert!(e.is_bind_error()),
            Ok(listener) => panic!("Bound {} twice", listener.local_addr()),
        }
    }

    #[tokio::test]
    async fn test_reload_moves_to_new_port() {
        let listener = QueryListener::start(local_config(), test_host(), DebugFlag::new(false))
            .await
            .unwrap();
        let old_addr = listener.local_addr();

        let free_port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let listener = listener
            .reload(local_config().with_port(free_port))
            .await
            .unwrap();
        let new_addr = listener.local_addr();

        assert_eq!(new_addr.port(), free_port);
        assert!(TcpStream::connect(old_addr).await.is_err());
        assert!(send(new_addr, b"QUERY_JSON\n")
            .await
            .starts_with("{\"serverPort\":25565"));
    }

    #[tokio::test]
    async fn test_connection_limit_rejects_excess() {
        let config = local_config().with_max_connections(1);
        let listener = QueryListener::start(config, test_host(), DebugFlag::new(false))
            .await
            .unwrap();
        let addr = listener.local_addr();

        // Holds the only handler slot by never sending a line
        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A rejected connection is closed straight away instead of waiting
        // for the read timeout
        let mut rejected = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_millis(500), rejected.read(&mut buf))
            .await
            .expect("rejected connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    /// Hands out a fixed sequence of accept results, then stays pending.
    struct ScriptedAcceptor {
        script: Mutex<VecDeque<io::Result<(DuplexStream, SocketAddr)>>>,
    }

    impl ScriptedAcceptor {
        fn new(script: Vec<io::Result<(DuplexStream, SocketAddr)>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    impl Accept for ScriptedAcceptor {
        type Stream = DuplexStream;

        fn poll_accept(
            &self,
            _cx: &mut Context<'_>,
        ) -> Poll<io::Result<(DuplexStream, SocketAddr)>> {
            match self.script.lock().unwrap().pop_front() {
                Some(result) => Poll::Ready(result),
                None => Poll::Pending,
            }
        }
    }

    fn spawn_accept_loop(
        acceptor: ScriptedAcceptor,
        shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        let addr: SocketAddr = "127.0.0.1:25566".parse().unwrap();
        tokio::spawn(accept_loop(
            acceptor,
            addr,
            shutdown,
            test_host(),
            local_config().handler_settings(),
            DebugFlag::new(false),
            Arc::new(Semaphore::new(4)),
        ))
    }

    #[tokio::test]
    async fn test_accept_loop_survives_transient_error() {
        let (mut client, server_side) = tokio::io::duplex(1024);
        let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let acceptor = ScriptedAcceptor::new(vec![
            Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Ok((server_side, peer)),
        ]);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = spawn_accept_loop(acceptor, shutdown_rx);

        // Served by the connection accepted after the failure
        client.write_all(b"QUERY\n").await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(
            response,
            "SERVERPORT 25565\nPLAYERCOUNT 1\nMAXPLAYERS 20\nPLAYERLIST [Alice]\n"
        );
        assert!(!task.is_finished());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_loop_ends_on_fatal_error() {
        let (_client, server_side) = tokio::io::duplex(1024);
        let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let acceptor = ScriptedAcceptor::new(vec![
            Err(io::Error::from(io::ErrorKind::InvalidInput)),
            Ok((server_side, peer)),
        ]);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = spawn_accept_loop(acceptor, shutdown_rx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop kept running after a fatal error")
            .unwrap();
    }

    #[tokio::test]
    async fn test_huge_connection_limit_does_not_panic() {
        let mut config = local_config().with_max_connections(usize::MAX);
        assert_eq!(config.max_connections, Semaphore::MAX_PERMITS);

        // Set directly, skipping the builder
        config.max_connections = usize::MAX;
        let listener = QueryListener::start(config, test_host(), DebugFlag::new(false))
            .await
            .unwrap();

        let response = send(listener.local_addr(), b"QUERY\n").await;
        assert!(response.starts_with("SERVERPORT 25565\n"));
    }

    #[tokio::test]
    async fn test_zero_connection_limit_still_serves() {
        let mut config = local_config();
        config.max_connections = 0;
        let listener = QueryListener::start(config, test_host(), DebugFlag::new(false))
            .await
            .unwrap();

        let response = send(listener.local_addr(), b"QUERY\n").await;
        assert!(response.starts_with("SERVERPORT 25565\n"));
    }

    #[tokio::test]
    async fn test_any_address_accepts_ipv4_clients() {
        let config = ListenerConfig::new(BindAddress::Any, 0);
        let listener = QueryListener::start(config, test_host(), DebugFlag::new(false))
            .await
            .unwrap();

        let bound = listener.local_addr();
        assert!(bound.ip().is_unspecified());

        let loopback = SocketAddr::from(([127, 0, 0, 1], bound.port()));
        let response = send(loopback, b"QUERY\n").await;
        assert!(response.starts_with("SERVERPORT 25565\n"));
    }
}
