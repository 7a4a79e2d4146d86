use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::{Transport, TransportResult, TransportStatus};

const DEFAULT_GREETING: &str = "OK MPD 0.23.5\n";

/// How a scripted server answers one command
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Response body (without the terminating `OK`)
    Ok(Vec<u8>),
    /// Full `ACK ...` line
    Ack(String),
    /// Never answer
    Silent,
}

#[derive(Debug)]
struct MockState {
    status: TransportStatus,
    greeting: String,
    /// Keyed by exact command line first, then by command name
    replies: HashMap<String, VecDeque<MockReply>>,
    rx_buffer: VecDeque<Vec<u8>>,
    sent: Vec<String>,
    partial: Vec<u8>,
    list: Option<(bool, Vec<String>)>,
    connect_count: u32,
    refuse_connect: bool,
    time_out_connect: bool,
    closed: bool,
}

/// Scripted MPD server for tests
///
/// Clones share state, so a test can keep one handle for scripting and
/// inspection while the connection owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            state: Arc::new(Mutex::new(MockState {
                status: TransportStatus::Disconnected,
                greeting: DEFAULT_GREETING.to_string(),
                replies: HashMap::new(),
                rx_buffer: VecDeque::new(),
                sent: Vec::new(),
                partial: Vec::new(),
                list: None,
                connect_count: 0,
                refuse_connect: false,
                time_out_connect: false,
                closed: false,
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Greet with the given protocol version instead of 0.23.5
    pub fn set_version(&self, version: &str) {
        self.with_state(|s| s.greeting = format!("OK MPD {}\n", version));
    }

    /// Queue a reply for a command line or command name
    ///
    /// Replies for the same key are used in order; the last one repeats.
    pub fn reply(&self, command: &str, reply: MockReply) {
        self.with_state(|s| {
            s.replies
                .entry(command.to_string())
                .or_default()
                .push_back(reply)
        });
    }

    /// Queue a text reply
    pub fn reply_text(&self, command: &str, body: &str) {
        self.reply(command, MockReply::Ok(body.as_bytes().to_vec()));
    }

    /// Make the next connects fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.with_state(|s| s.refuse_connect = refuse);
    }

    /// Make the next connects run past their timeout
    pub fn time_out_connections(&self, time_out: bool) {
        self.with_state(|s| s.time_out_connect = time_out);
    }

    /// Simulate the server dropping the connection
    pub fn drop_connection(&self) {
        self.with_state(|s| s.closed = true);
    }

    /// Push raw bytes to the client
    pub fn inject(&self, data: &[u8]) {
        self.with_state(|s| s.rx_buffer.push_back(data.to_vec()));
    }

    /// Every command line received so far, including list markers
    pub fn sent_commands(&self) -> Vec<String> {
        self.with_state(|s| s.sent.clone())
    }

    /// Remove and return every command line received so far
    pub fn take_sent_commands(&self) -> Vec<String> {
        self.with_state(|s| std::mem::take(&mut s.sent))
    }

    pub fn connect_count(&self) -> u32 {
        self.with_state(|s| s.connect_count)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn lookup(&mut self, line: &str) -> MockReply {
        let name = line.split_whitespace().next().unwrap_or("");
        for key in [line, name] {
            if let Some(queue) = self.replies.get_mut(key) {
                if queue.len() > 1 {
                    if let Some(reply) = queue.pop_front() {
                        return reply;
                    }
                }
                if let Some(reply) = queue.front() {
                    return reply.clone();
                }
            }
        }
        MockReply::Ok(Vec::new())
    }

    fn answer(&mut self, line: String) {
        self.sent.push(line.clone());

        match line.as_str() {
            "command_list_begin" => {
                self.list = Some((false, Vec::new()));
                return;
            }
            "command_list_ok_begin" => {
                self.list = Some((true, Vec::new()));
                return;
            }
            "command_list_end" => {
                if let Some((ok_separated, commands)) = self.list.take() {
                    self.answer_list(ok_separated, commands);
                }
                return;
            }
            _ => {}
        }

        if let Some((_, commands)) = self.list.as_mut() {
            commands.push(line);
            return;
        }

        match self.lookup(&line) {
            MockReply::Ok(mut body) => {
                body.extend_from_slice(b"OK\n");
                self.rx_buffer.push_back(body);
            }
            MockReply::Ack(ack) => self.rx_buffer.push_back(format!("{}\n", ack).into_bytes()),
            MockReply::Silent => {}
        }
    }

    fn answer_list(&mut self, ok_separated: bool, commands: Vec<String>) {
        let mut out = Vec::new();
        for (index, command) in commands.iter().enumerate() {
            match self.lookup(command) {
                MockReply::Ok(body) => {
                    out.extend_from_slice(&body);
                    if ok_separated {
                        out.extend_from_slice(b"list_OK\n");
                    }
                }
                MockReply::Ack(ack) => {
                    // the server reports the failing index and stops
                    let ack = ack.replacen("@0]", &format!("@{}]", index), 1);
                    out.extend_from_slice(ack.as_bytes());
                    out.push(b'\n');
                    self.rx_buffer.push_back(out);
                    return;
                }
                MockReply::Silent => return,
            }
        }
        out.extend_from_slice(b"OK\n");
        self.rx_buffer.push_back(out);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> TransportStatus {
        self.with_state(|s| s.status)
    }

    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> TransportResult<()> {
        self.name = format!("mock://{}:{}", host, port);
        self.with_state(|s| -> TransportResult<()> {
            s.connect_count += 1;
            if s.time_out_connect {
                s.status = TransportStatus::Error;
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", timeout),
                )
                .into());
            }
            if s.refuse_connect {
                s.status = TransportStatus::Error;
                return Err("Connection refused".into());
            }
            s.status = TransportStatus::Connected;
            s.closed = false;
            s.partial.clear();
            s.list = None;
            s.rx_buffer.clear();
            let greeting = s.greeting.clone().into_bytes();
            s.rx_buffer.push_back(greeting);
            Ok(())
        })
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.with_state(|s| {
            s.status = TransportStatus::Disconnected;
            s.rx_buffer.clear();
        });
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.with_state(|s| -> TransportResult<()> {
            if s.status != TransportStatus::Connected || s.closed {
                return Err("Not connected".into());
            }
            s.partial.extend_from_slice(data);
            while let Some(end) = s.partial.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = s.partial.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line).trim_end().to_string();
                s.answer(line);
            }
            Ok(())
        })
    }

    async fn receive(&mut self) -> TransportResult<Option<Vec<u8>>> {
        let next = self.with_state(|s| -> TransportResult<Option<Vec<u8>>> {
            if s.status != TransportStatus::Connected {
                return Err("Not connected".into());
            }
            if let Some(data) = s.rx_buffer.pop_front() {
                return Ok(Some(data));
            }
            if s.closed {
                s.status = TransportStatus::Disconnected;
                return Err("connection closed by server".into());
            }
            Ok(None)
        })?;

        if next.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> MockTransport {
        let mut mock = MockTransport::new();
        mock.connect("localhost", 6600, Duration::from_secs(1))
            .await
            .unwrap();
        mock
    }

    #[tokio::test]
    async fn test_mock_greets_on_connect() {
        let mut mock = connected().await;
        assert_eq!(mock.status(), TransportStatus::Connected);
        let greeting = mock.receive().await.unwrap().unwrap();
        assert_eq!(greeting, b"OK MPD 0.23.5\n");
        assert_eq!(mock.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_scripted_replies() {
        let mut mock = connected().await;
        mock.receive().await.unwrap();

        mock.reply_text("status", "state: play\n");
        mock.reply("play 5", MockReply::Ack("ACK [2@0] {play} Bad song index".to_string()));

        mock.send(b"status\nplay 5\nclear\n").await.unwrap();
        assert_eq!(mock.receive().await.unwrap().unwrap(), b"state: play\nOK\n");
        assert_eq!(
            mock.receive().await.unwrap().unwrap(),
            b"ACK [2@0] {play} Bad song index\n"
        );
        assert_eq!(mock.receive().await.unwrap().unwrap(), b"OK\n");
        assert_eq!(mock.sent_commands(), vec!["status", "play 5", "clear"]);
    }

    #[tokio::test]
    async fn test_mock_command_list() {
        let mut mock = connected().await;
        mock.receive().await.unwrap();
        mock.reply_text("status", "state: stop\n");
        mock.reply_text("currentsong", "file: a.mp3\n");

        mock.send(b"command_list_ok_begin\nstatus\ncurrentsong\ncommand_list_end\n")
            .await
            .unwrap();
        assert_eq!(
            mock.receive().await.unwrap().unwrap(),
            b"state: stop\nlist_OK\nfile: a.mp3\nlist_OK\nOK\n"
        );
    }

    #[tokio::test]
    async fn test_mock_sequenced_replies_and_drop() {
        let mut mock = connected().await;
        mock.receive().await.unwrap();
        mock.reply_text("count", "songs: 1\n");
        mock.reply_text("count", "songs: 2\n");

        mock.send(b"count\ncount\ncount\n").await.unwrap();
        assert_eq!(mock.receive().await.unwrap().unwrap(), b"songs: 1\nOK\n");
        assert_eq!(mock.receive().await.unwrap().unwrap(), b"songs: 2\nOK\n");
        assert_eq!(mock.receive().await.unwrap().unwrap(), b"songs: 2\nOK\n");

        mock.drop_connection();
        assert!(mock.receive().await.is_err());
    }
}
