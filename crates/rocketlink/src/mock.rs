//! In-memory transport for state machine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rocketlink_sched::ManualScheduler;
use rocketlink_transport::{
    CloseFrame, Connection, ConnectionId, Connector, Received, TransportError,
};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::listener::{Listener, ListenerEvent, TransportEvent};
use crate::{Socket, SocketBuilder, SocketConfig, SocketEvent, SocketSettings};

#[derive(Debug, Clone, Copy)]
pub(crate) enum MockMode {
    /// `connect` never completes.
    Hang,
    /// `connect` fails immediately.
    Fail,
    /// `connect` succeeds with a scripted connection.
    Open,
}

/// The test's side of one mock connection.
#[derive(Clone)]
pub(crate) struct MockRemote {
    inbound: mpsc::UnboundedSender<Received>,
    sent: Arc<AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    closes: Arc<AsyncMutex<mpsc::UnboundedReceiver<CloseFrame>>>,
}

impl MockRemote {
    /// Makes the client's next `recv` return `item`.
    pub(crate) fn push(&self, item: Received) {
        self.inbound.send(item).unwrap();
    }

    pub(crate) async fn next_sent(&self) -> Vec<u8> {
        self.sent.lock().await.recv().await.unwrap()
    }

    pub(crate) async fn next_close(&self) -> CloseFrame {
        self.closes.lock().await.recv().await.unwrap()
    }

    pub(crate) fn try_next_close(&self) -> Result<CloseFrame, TryRecvError> {
        self.closes.try_lock().unwrap().try_recv()
    }
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    mode: MockMode,
    attempts: Arc<AtomicUsize>,
    remotes: Arc<Mutex<Vec<MockRemote>>>,
}

impl MockConnector {
    pub(crate) fn new(mode: MockMode) -> Self {
        Self {
            mode,
            attempts: Arc::new(AtomicUsize::new(0)),
            remotes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The remote end of the `index`-th opened connection.
    pub(crate) fn remote(&self, index: usize) -> MockRemote {
        self.remotes.lock().unwrap()[index].clone()
    }

    fn open(&self) -> MockConnection {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        self.remotes.lock().unwrap().push(MockRemote {
            inbound: inbound_tx.clone(),
            sent: Arc::new(AsyncMutex::new(sent_rx)),
            closes: Arc::new(AsyncMutex::new(close_rx)),
        });
        MockConnection {
            id: ConnectionId::next(),
            inbound: AsyncMutex::new(inbound_rx),
            echo: inbound_tx,
            sent: sent_tx,
            closes: close_tx,
        }
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(
        &self,
        _url: &str,
        _token: Option<&str>,
    ) -> Result<MockConnection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            MockMode::Hang => std::future::pending().await,
            MockMode::Fail => {
                Err(TransportError::ConnectFailed("connection refused".into()))
            }
            MockMode::Open => Ok(self.open()),
        }
    }
}

pub(crate) struct MockConnection {
    id: ConnectionId,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Received>>,
    echo: mpsc::UnboundedSender<Received>,
    sent: mpsc::UnboundedSender<Vec<u8>>,
    closes: mpsc::UnboundedSender<CloseFrame>,
}

impl Connection for MockConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let _ = self.sent.send(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        Ok(self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Received::Closed(None)))
    }

    /// Records the frame and answers it, as a well-behaved peer would.
    async fn close(&self, frame: CloseFrame) -> Result<(), TransportError> {
        let _ = self.closes.send(frame.clone());
        let _ = self.echo.send(Received::Closed(Some(frame)));
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A socket wired to a mock transport and a manual scheduler, with its
/// listener driven by hand.
pub(crate) struct Harness {
    pub(crate) socket: Socket<MockConnector>,
    pub(crate) listener: Listener<MockConnector>,
    pub(crate) events: mpsc::UnboundedReceiver<ListenerEvent>,
    pub(crate) sched: ManualScheduler,
    pub(crate) observed: mpsc::UnboundedReceiver<SocketEvent>,
    pub(crate) connector: MockConnector,
}

impl Harness {
    pub(crate) fn new(mode: MockMode) -> Self {
        Self::with_builder(mode, |b| b)
    }

    pub(crate) fn with_builder(
        mode: MockMode,
        customize: impl FnOnce(
            SocketBuilder<MockConnector>,
        ) -> SocketBuilder<MockConnector>,
    ) -> Self {
        Self::build(mode, |_| {}, customize)
    }

    pub(crate) fn with_config(
        mode: MockMode,
        configure: impl FnOnce(&mut SocketConfig),
    ) -> Self {
        Self::build(mode, configure, |b| b)
    }

    fn build(
        mode: MockMode,
        configure: impl FnOnce(&mut SocketConfig),
        customize: impl FnOnce(
            SocketBuilder<MockConnector>,
        ) -> SocketBuilder<MockConnector>,
    ) -> Self {
        let sched = ManualScheduler::new();
        let connector = MockConnector::new(mode);
        let (observer, observed) = mpsc::unbounded_channel();
        let mut config = SocketConfig::new(SocketSettings::new(
            "wss://example.test",
            "",
        ));
        config.heartbeat.initial_jitter = Duration::ZERO;
        configure(&mut config);
        let builder = SocketBuilder::new(config)
            .connector(connector.clone())
            .scheduler(sched.clone())
            .observer(observer);
        let (socket, listener, events) = customize(builder).build_parts();
        Self {
            socket,
            listener,
            events,
            sched,
            observed,
            connector,
        }
    }

    pub(crate) fn current(&self) -> ConnectionId {
        self.socket.current_connection().unwrap()
    }

    pub(crate) fn inject(&self, event: TransportEvent) {
        self.listener.handle(event);
    }

    /// Hands the next queued driver event to the listener.
    pub(crate) async fn pump(&mut self) {
        match self.events.recv().await.unwrap() {
            ListenerEvent::Transport(event) => self.listener.handle(event),
            ListenerEvent::Shutdown => panic!("unexpected shutdown"),
        }
    }

    pub(crate) fn open(&self) -> ConnectionId {
        self.socket.connect().unwrap();
        let id = self.current();
        self.inject(TransportEvent::Opened { id });
        id
    }

    pub(crate) fn message(&self, json: &str) {
        self.inject(TransportEvent::Message {
            id: self.current(),
            data: json.as_bytes().to_vec(),
        });
    }
}
