// AOF (Append-Only File) persistence - the server's write-ahead log

use crate::commands::dispatcher;
use crate::protocol::{next_frame, RespValue};
use crate::server::{Session, Shared};
use bytes::{Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// AOF sync policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AofSyncPolicy {
    /// Sync every write (safest, slowest)
    Always,
    /// Sync every second (balanced)
    EverySecond,
    /// Let OS decide when to sync (fastest, least safe)
    No,
}

/// AOF writer - appends propagation frames to the log.
///
/// Writes are synchronous so they can run inside the command gate; with
/// the `EverySecond` policy the buffered bytes are pushed to disk by a
/// background task (see [`spawn_everysec_flush`]).
#[derive(Debug)]
pub struct AofWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
    sync_policy: AofSyncPolicy,
}

impl AofWriter {
    /// Open (or create) the AOF file in append mode.
    pub fn new(path: impl AsRef<Path>, sync_policy: AofSyncPolicy) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("AOF writer created at {:?} with policy {:?}", path, sync_policy);

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
            sync_policy,
        })
    }

    /// Append an already-encoded RESP frame to the log.
    pub fn append_frame(&self, frame: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.file.lock().unwrap();
        writer.write_all(frame)?;

        if self.sync_policy == AofSyncPolicy::Always {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }

        Ok(())
    }

    /// Flush buffered bytes to disk.
    pub fn flush(&self) -> anyhow::Result<()> {
        let mut writer = self.file.lock().unwrap();
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Get the path of the AOF file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Background flush loop for the `EverySecond` sync policy.
pub fn spawn_everysec_flush(aof: Arc<AofWriter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if let Err(e) = aof.flush() {
                warn!("AOF background flush failed: {}", e);
            }
        }
    })
}

/// AOF reader - replays the log at startup.
pub struct AofReader {
    path: PathBuf,
}

impl AofReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Replay the log by dispatching every stored frame as if a client
    /// had sent it. The caller must have set the server's loading flag:
    /// propagation and monitor feeds are suppressed while it is up, so
    /// replaying cannot re-append to the log being read.
    ///
    /// A trailing partial frame (torn final write) ends the replay
    /// without error; anything malformed before that is reported.
    pub fn load(&self, shared: &Shared) -> anyhow::Result<usize> {
        if !self.path.exists() {
            info!("AOF file does not exist, skipping load");
            return Ok(0);
        }

        info!("Loading AOF from {:?}", self.path);

        let mut raw = Vec::new();
        File::open(&self.path)?.read_to_end(&mut raw)?;
        let mut buffer = BytesMut::from(&raw[..]);

        let mut session = Session::new(0, "aof-loader".to_string());
        let mut commands_loaded = 0;

        loop {
            let frame = match next_frame(&mut buffer)? {
                Some(frame) => frame,
                None => {
                    if !buffer.is_empty() {
                        warn!("AOF ends with a truncated frame, ignoring the tail");
                    }
                    break;
                }
            };

            let argv = match Self::frame_to_argv(frame) {
                Some(argv) => argv,
                None => {
                    warn!("Skipping malformed AOF frame");
                    continue;
                }
            };

            let reply = dispatcher::dispatch(shared, &mut session, argv);
            if reply.is_error() {
                warn!("AOF replay command failed: {:?}", reply);
            }
            commands_loaded += 1;
        }

        debug!("AOF replay dispatched {} commands", commands_loaded);
        Ok(commands_loaded)
    }

    fn frame_to_argv(frame: RespValue) -> Option<Vec<Bytes>> {
        let items = match frame {
            RespValue::Array(Some(items)) if !items.is_empty() => items,
            _ => return None,
        };

        let mut argv = Vec::with_capacity(items.len());
        for item in items {
            match item {
                RespValue::BulkString(Some(data)) => argv.push(data),
                RespValue::SimpleString(s) => argv.push(Bytes::from(s)),
                _ => return None,
            }
        }
        Some(argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_command;
    use crate::server::ServerConfig;
    use tempfile::TempDir;

    fn frame(parts: &[&str]) -> Vec<u8> {
        let argv: Vec<Bytes> = parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        encode_command(&argv).to_vec()
    }

    #[test]
    fn test_writer_appends_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");

        let writer = AofWriter::new(&path, AofSyncPolicy::Always).unwrap();
        writer.append_frame(&frame(&["SET", "a", "1"])).unwrap();
        writer.append_frame(&frame(&["DEL", "a"])).unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read(&path).unwrap();
        let mut expected = frame(&["SET", "a", "1"]);
        expected.extend_from_slice(&frame(&["DEL", "a"]));
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_reader_replays_into_keyspace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");

        let writer = AofWriter::new(&path, AofSyncPolicy::Always).unwrap();
        writer.append_frame(&frame(&["SET", "a", "1"])).unwrap();
        writer.append_frame(&frame(&["INCR", "a"])).unwrap();
        writer.append_frame(&frame(&["SELECT", "2"])).unwrap();
        writer.append_frame(&frame(&["SET", "b", "x"])).unwrap();
        writer.flush().unwrap();

        let shared = Shared::new(ServerConfig::default()).unwrap();
        shared.set_loading(true);
        let loaded = AofReader::new(&path).load(&shared).unwrap();
        shared.set_loading(false);

        assert_eq!(loaded, 4);
        assert_eq!(shared.keyspace.get(0, b"a"), Some(Bytes::from_static(b"2")));
        assert_eq!(shared.keyspace.get(2, b"b"), Some(Bytes::from_static(b"x")));
    }

    #[test]
    fn test_reader_replays_transaction_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");

        let writer = AofWriter::new(&path, AofSyncPolicy::Always).unwrap();
        writer.append_frame(&frame(&["MULTI"])).unwrap();
        writer.append_frame(&frame(&["SET", "a", "1"])).unwrap();
        writer.append_frame(&frame(&["INCR", "a"])).unwrap();
        writer.append_frame(&frame(&["EXEC"])).unwrap();
        writer.flush().unwrap();

        let shared = Shared::new(ServerConfig::default()).unwrap();
        shared.set_loading(true);
        AofReader::new(&path).load(&shared).unwrap();
        shared.set_loading(false);

        assert_eq!(shared.keyspace.get(0, b"a"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn test_reader_tolerates_truncated_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendonly.aof");

        let mut data = frame(&["SET", "a", "1"]);
        data.extend_from_slice(b"*2\r\n$3\r\nDEL");
        std::fs::write(&path, &data).unwrap();

        let shared = Shared::new(ServerConfig::default()).unwrap();
        shared.set_loading(true);
        let loaded = AofReader::new(&path).load(&shared).unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(shared.keyspace.get(0, b"a"), Some(Bytes::from_static(b"1")));
    }

    #[test]
    fn test_reader_missing_file() {
        let dir = TempDir::new().unwrap();
        let shared = Shared::new(ServerConfig::default()).unwrap();
        let loaded = AofReader::new(dir.path().join("nope.aof")).load(&shared).unwrap();
        assert_eq!(loaded, 0);
    }
}
