// TCP Server listener

use super::config::ServerConfig;
use super::connection::Connection;
use super::session::Session;
use super::shared::Shared;
use crate::persistence::aof::{spawn_everysec_flush, AofReader, AofSyncPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub struct CinnabarServer {
    shared: Arc<Shared>,
    listener: TcpListener,
    /// Limit max concurrent connections
    limit_connections: Arc<Semaphore>,
}

impl CinnabarServer {
    /// Create the shared state, replay the write-ahead log, and bind
    /// the listening socket.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let max_clients = config.max_clients;
        let shared = Arc::new(Shared::new(config)?);

        if shared.config.aof_enabled && std::path::Path::new(&shared.config.aof_filename).exists()
        {
            info!("Loading AOF from {}", shared.config.aof_filename);
            shared.set_loading(true);
            let reader = AofReader::new(&shared.config.aof_filename);
            match reader.load(&shared) {
                Ok(count) => info!("AOF loaded {} commands", count),
                Err(e) => warn!("Failed to load AOF: {}", e),
            }
            shared.set_loading(false);
        }

        if shared.config.aof_sync_policy == AofSyncPolicy::EverySecond {
            if let Some(aof) = shared.propagator.aof() {
                spawn_everysec_flush(aof);
            }
        }

        let listener = TcpListener::bind(shared.config.addr()).await?;
        info!("Cinnabar server listening on {}", listener.local_addr()?);

        Ok(Self {
            shared,
            listener,
            limit_connections: Arc::new(Semaphore::new(max_clients)),
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            // Wait for permit to accept new connection
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .expect("connection semaphore closed");

            let (socket, addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let shared = self.shared.clone();
            let session = Session::new(shared.next_session_id(), addr.to_string());
            info!("Accepted connection from {} as session {}", addr, session.id);

            tokio::spawn(async move {
                let session_id = session.id;
                if let Err(e) = Self::handle_connection(socket, shared.clone(), session).await {
                    error!("Connection error: {}", e);
                }

                // Disconnect runs the same cleanup as DISCARD: watches
                // dropped, CAS-dirty bit cleared, queue freed with the
                // session. Must happen before the id is retired.
                {
                    let _guard = shared.gate.lock().await;
                    shared.keyspace.unwatch_all(session_id);
                }
                shared.monitors.unregister(session_id);

                drop(permit);
            });
        }
    }

    async fn handle_connection(
        socket: TcpStream,
        shared: Arc<Shared>,
        session: Session,
    ) -> anyhow::Result<()> {
        let mut connection = Connection::new(socket, shared, session);
        connection.process().await
    }
}
