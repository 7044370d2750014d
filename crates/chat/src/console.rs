use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::{ChatEvent, MessageHandle, Responder, ResponderError};
use crate::listener::{EventSource, TransportError};

pub const CONSOLE_USER_ID: &str = "console-user";
pub const CONSOLE_CHANNEL_ID: &str = "console";

/// Reads one chat event per input line. Blank lines are skipped.
pub struct ConsoleSource<R> {
    lines: Mutex<Lines<R>>,
}

impl ConsoleSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { lines: Mutex::new(reader.lines()) }
    }
}

#[async_trait]
impl<R> EventSource for ConsoleSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(ChatEvent {
                event_id: Uuid::new_v4().to_string(),
                user_id: CONSOLE_USER_ID.to_owned(),
                channel_id: CONSOLE_CHANNEL_ID.to_owned(),
                text: line,
                received_at: Utc::now(),
            }));
        }
    }

    async fn acknowledge(&self, _event_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Writes replies as lines. A terminal cannot rewrite earlier output, so an
/// edit is printed as a fresh line.
pub struct ConsoleResponder<W> {
    writer: Mutex<W>,
}

impl ConsoleResponder<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleResponder<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, line: String) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
}

#[async_trait]
impl<W> Responder for ConsoleResponder<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, channel_id: &str, text: &str) -> Result<MessageHandle, ResponderError> {
        let message_id = Uuid::new_v4().simple().to_string();
        self.write_line(format!("[{channel_id}] {text}"))
            .await
            .map_err(|error| ResponderError::Send(error.to_string()))?;
        Ok(MessageHandle { channel_id: channel_id.to_owned(), message_id })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), ResponderError> {
        self.write_line(format!("[{}] {text}", handle.channel_id))
            .await
            .map_err(|error| ResponderError::Edit(error.to_string()))
    }
}
