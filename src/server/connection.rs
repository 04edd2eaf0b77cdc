// Connection handler

use super::session::Session;
use super::shared::Shared;
use crate::commands::dispatcher;
use crate::protocol::{next_frame, RespValue};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    shared: Arc<Shared>,
    session: Session,
}

impl Connection {
    pub fn new(socket: TcpStream, shared: Arc<Shared>, session: Session) -> Self {
        Self {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4096),
            shared,
            session,
        }
    }

    /// Main processing loop for this connection
    pub async fn process(&mut self) -> anyhow::Result<()> {
        loop {
            match self.parse_frame()? {
                Some(frame) => {
                    debug!("Session {}: received frame {:?}", self.session.id, frame);
                    let response = self.handle_frame(frame).await;
                    self.write_response(response).await?;

                    if self.session.monitor {
                        return self.run_monitor().await;
                    }
                }
                None => {
                    // Need more data
                    if self.read_frame().await? == 0 {
                        // Connection closed by client
                        if self.buffer.is_empty() {
                            return Ok(());
                        } else {
                            return Err(anyhow::anyhow!("Connection reset by peer"));
                        }
                    }
                }
            }
        }
    }

    /// Try to parse a complete frame from the buffer. Argument payloads
    /// in the returned value alias the read buffer's storage, so a
    /// queued command holds refcounts, not copies.
    fn parse_frame(&mut self) -> anyhow::Result<Option<RespValue>> {
        Ok(next_frame(&mut self.buffer)?)
    }

    /// Read data from socket into buffer
    async fn read_frame(&mut self) -> anyhow::Result<usize> {
        let stream = self.stream.get_mut();
        let mut read_buf = [0u8; 4096];
        let n = stream.read(&mut read_buf).await?;
        if n > 0 {
            self.buffer.extend_from_slice(&read_buf[..n]);
        }
        Ok(n)
    }

    /// Handle a parsed frame and generate a response
    async fn handle_frame(&mut self, frame: RespValue) -> RespValue {
        let args = match frame {
            RespValue::Array(Some(arr)) if !arr.is_empty() => arr,
            _ => {
                return RespValue::error("ERR invalid command format");
            }
        };

        let mut argv: Vec<Bytes> = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                RespValue::BulkString(Some(data)) => argv.push(data),
                RespValue::SimpleString(s) => argv.push(Bytes::from(s)),
                _ => {
                    return RespValue::error("ERR invalid argument type");
                }
            }
        }

        // The gate is held for the whole dispatch, EXEC drain included.
        let _guard = self.shared.gate.lock().await;
        dispatcher::dispatch(&self.shared, &mut self.session, argv)
    }

    /// Forward monitor lines until either side goes away. Input from a
    /// monitoring client is discarded.
    async fn run_monitor(&mut self) -> anyhow::Result<()> {
        let rx = self.shared.monitors.register(self.session.id);
        let result = self.forward_monitor_lines(rx).await;
        self.shared.monitors.unregister(self.session.id);
        result
    }

    async fn forward_monitor_lines(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<Bytes>,
    ) -> anyhow::Result<()> {
        let stream = self.stream.get_mut();
        let (mut reader, mut writer) = stream.split();
        let mut discard = [0u8; 512];

        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => {
                        writer.write_all(&line).await?;
                        writer.flush().await?;
                    }
                    None => return Ok(()),
                },
                n = reader.read(&mut discard) => {
                    if n? == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Write response to client
    async fn write_response(&mut self, response: RespValue) -> anyhow::Result<()> {
        let data = response.to_wire();
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn session_id(&self) -> u64 {
        self.session.id
    }
}
