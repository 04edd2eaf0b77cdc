// Server configuration

use crate::persistence::aof::AofSyncPolicy;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Maximum number of concurrent clients
    pub max_clients: usize,
    /// Number of databases (default 16)
    pub databases: usize,
    /// Enable AOF persistence (the write-ahead log)
    pub aof_enabled: bool,
    /// AOF file path
    pub aof_filename: String,
    /// AOF sync policy
    pub aof_sync_policy: AofSyncPolicy,
    /// Refuse writes from ordinary clients while this server is a replica
    pub replica_read_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            max_clients: 10000,
            databases: 16,
            aof_enabled: false,
            aof_filename: "appendonly.aof".to_string(),
            aof_sync_policy: AofSyncPolicy::EverySecond,
            replica_read_only: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: String) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_databases(mut self, databases: usize) -> Self {
        self.databases = databases;
        self
    }

    pub fn with_aof(mut self, filename: impl Into<String>) -> Self {
        self.aof_enabled = true;
        self.aof_filename = filename.into();
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
