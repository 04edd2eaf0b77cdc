// Monitor fan-out - passive observers of executed commands

use crate::storage::current_timestamp_ms;
use bytes::Bytes;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// One attached monitor: the connection task owning the receiver writes
/// delivered lines to the monitoring client's socket.
#[derive(Debug)]
struct MonitorFeed {
    session_id: u64,
    sender: mpsc::UnboundedSender<Bytes>,
}

/// Registry of MONITOR observers.
///
/// Delivery is best-effort and non-blocking; a monitor whose connection
/// went away is dropped at the next feed. A client never sees its own
/// commands echoed back.
#[derive(Debug, Default)]
pub struct MonitorHub {
    feeds: Mutex<Vec<MonitorFeed>>,
}

impl MonitorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session as a monitor, returning its delivery channel.
    pub fn register(&self, session_id: u64) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain(|feed| feed.session_id != session_id);
        feeds.push(MonitorFeed {
            session_id,
            sender: tx,
        });
        debug!("Session {} attached as monitor", session_id);
        rx
    }

    pub fn unregister(&self, session_id: u64) {
        self.feeds.lock().unwrap().retain(|feed| feed.session_id != session_id);
    }

    pub fn has_monitors(&self) -> bool {
        !self.feeds.lock().unwrap().is_empty()
    }

    /// Deliver one executed command to every monitor except the
    /// originating session.
    pub fn feed(&self, from_session: u64, db_index: usize, addr: &str, argv: &[Bytes]) {
        let mut feeds = self.feeds.lock().unwrap();
        if feeds.is_empty() {
            return;
        }

        let line = Self::format_line(db_index, addr, argv);
        feeds.retain(|feed| {
            if feed.session_id == from_session {
                return true;
            }
            feed.sender.send(line.clone()).is_ok()
        });
    }

    /// Monitor lines are RESP status replies:
    /// `+<unix time> [<db> <addr>] "CMD" "arg" ...`
    fn format_line(db_index: usize, addr: &str, argv: &[Bytes]) -> Bytes {
        let now_ms = current_timestamp_ms();
        let mut line = format!("+{}.{:06} [{} {}]", now_ms / 1000, (now_ms % 1000) * 1000, db_index, addr);
        for arg in argv {
            line.push(' ');
            line.push_str(&format!("{:?}", String::from_utf8_lossy(arg)));
        }
        line.push_str("\r\n");
        Bytes::from(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn test_feed_reaches_monitors() {
        let hub = MonitorHub::new();
        let mut rx = hub.register(7);
        assert!(hub.has_monitors());

        hub.feed(1, 0, "127.0.0.1:4000", &argv(&["SET", "a", "1"]));

        let line = rx.recv().await.unwrap();
        let text = String::from_utf8_lossy(&line);
        assert!(text.starts_with('+'));
        assert!(text.contains("[0 127.0.0.1:4000]"));
        assert!(text.contains("\"SET\" \"a\" \"1\""));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_monitor_does_not_see_own_commands() {
        let hub = MonitorHub::new();
        let mut rx = hub.register(7);

        hub.feed(7, 0, "127.0.0.1:4000", &argv(&["PING"]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let hub = MonitorHub::new();
        let _rx = hub.register(7);
        hub.unregister(7);
        assert!(!hub.has_monitors());
    }

    #[test]
    fn test_dead_monitor_is_dropped() {
        let hub = MonitorHub::new();
        let rx = hub.register(7);
        drop(rx);

        hub.feed(1, 0, "addr", &argv(&["PING"]));
        assert!(!hub.has_monitors());
    }
}
