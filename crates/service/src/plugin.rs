//! Plugin lifecycle: initialize, startup, shutdown.

use crate::acceptor;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::events::ServiceEvent;
use crate::service_loop::{AcceptorHandle, ServiceLoop};
use crossbeam_channel::Sender;
use scribe_chain::{ChainPlugin, SignalConnection};
use scribe_ingest::BlockIngestor;
use scribe_log::HistoryLog;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// The state-history plugin.
///
/// Owns the loop thread, the acceptor task, and the scoped signal
/// subscriptions. Sessions hold only the loop's channel, so dropping a
/// session from the registry is all it takes for it to die once its
/// in-flight callbacks finish.
pub struct StateHistoryPlugin {
    events: Sender<ServiceEvent>,
    stopping: Arc<AtomicBool>,
    endpoint: SocketAddr,
    loop_thread: Option<std::thread::JoinHandle<Result<(), ServiceError>>>,
    acceptor_task: Option<tokio::task::JoinHandle<()>>,
    acceptor_abort: AcceptorHandle,
    signal_connections: Vec<SignalConnection>,
}

impl StateHistoryPlugin {
    /// Resolve the state-history directory, open the three logs, start
    /// the loop thread, and subscribe to the chain's signals.
    pub fn initialize(
        chain: Arc<dyn ChainPlugin>,
        config: &ServiceConfig,
        data_dir: &Path,
    ) -> Result<Self, ServiceError> {
        let endpoint = config.parse_endpoint()?;
        let dir = config.resolve_dir(data_dir);

        if config.delete_state_history {
            info!(dir = %dir.display(), "deleting state history");
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        std::fs::create_dir_all(&dir)?;

        let open = |name: &str| {
            HistoryLog::open(
                name,
                dir.join(format!("{name}.log")),
                dir.join(format!("{name}.index")),
            )
        };
        let ingestor = BlockIngestor::new(
            open("block_state_history")?,
            open("trace_history")?,
            open("chain_state_history")?,
        );

        let (events, receiver) = crossbeam_channel::unbounded();
        let stopping = Arc::new(AtomicBool::new(false));
        let acceptor_abort: AcceptorHandle = Arc::new(Mutex::new(None));

        let service_loop = ServiceLoop::new(
            chain.clone(),
            ingestor,
            stopping.clone(),
            acceptor_abort.clone(),
        );
        let loop_thread = std::thread::Builder::new()
            .name("state-history".to_string())
            .spawn(move || service_loop.run(receiver))?;

        let tx = events.clone();
        let flag = stopping.clone();
        let applied_connection = chain.applied_transaction().connect(move |trace| {
            if flag.load(Ordering::Relaxed) {
                return;
            }
            let _ = tx.send(ServiceEvent::TransactionApplied(trace.clone()));
        });
        let tx = events.clone();
        let flag = stopping.clone();
        let accepted_connection = chain.accepted_block().connect(move |block| {
            if flag.load(Ordering::Relaxed) {
                return;
            }
            let _ = tx.send(ServiceEvent::BlockAccepted(block.clone()));
        });

        Ok(Self {
            events,
            stopping,
            endpoint,
            loop_thread: Some(loop_thread),
            acceptor_task: None,
            acceptor_abort,
            signal_connections: vec![applied_connection, accepted_connection],
        })
    }

    /// Bind the configured endpoint and start accepting connections.
    ///
    /// Returns the bound address (useful when the configured port is 0).
    pub async fn startup(&mut self) -> Result<SocketAddr, ServiceError> {
        let listener = acceptor::bind(self.endpoint)?;
        let local_addr = listener.local_addr()?;
        info!(endpoint = %local_addr, "state history listening");
        let task = tokio::spawn(acceptor::run(
            listener,
            self.events.clone(),
            self.stopping.clone(),
        ));
        *self
            .acceptor_abort
            .lock()
            .expect("acceptor handle lock poisoned") = Some(task.abort_handle());
        self.acceptor_task = Some(task);
        Ok(local_addr)
    }

    /// Disconnect the chain signals, close every session, and stop the
    /// loop thread.
    ///
    /// Returns the error that aborted the loop, if ingestion failed
    /// earlier; the embedding application must treat that as fatal.
    pub fn shutdown(&mut self) -> Result<(), ServiceError> {
        self.signal_connections.clear();
        let _ = self.events.send(ServiceEvent::Shutdown);
        self.stopping.store(true, Ordering::Relaxed);
        self.acceptor_abort
            .lock()
            .expect("acceptor handle lock poisoned")
            .take();
        if let Some(task) = self.acceptor_task.take() {
            task.abort();
        }
        match self.loop_thread.take() {
            Some(thread) => match thread.join() {
                Ok(result) => result,
                Err(_) => {
                    error!("state history loop panicked");
                    Err(ServiceError::LoopPanicked)
                }
            },
            None => Ok(()),
        }
    }
}

impl Drop for StateHistoryPlugin {
    fn drop(&mut self) {
        if self.loop_thread.is_some() {
            if let Err(err) = self.shutdown() {
                error!(error = %err, "state history shutdown reported an error");
            }
        }
    }
}
