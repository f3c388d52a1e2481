//! One websocket session: serialized send and receive over a split socket.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SessionError;

/// Wrapper over one websocket with independent send-side and receive-side
/// locks: a frame is never interleaved with another, but reads and writes
/// proceed concurrently.
pub struct Session {
    id: Uuid,
    sender: Mutex<Option<SplitSink<WebSocket, Message>>>,
    receiver: Mutex<Option<SplitStream<WebSocket>>>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        Self {
            id: Uuid::new_v4(),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            closed: AtomicBool::new(false),
        }
    }

    /// A session with no transport attached; sends fail as `Closed` and
    /// reads report end-of-stream. Used by registry tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Mutex::new(None),
            receiver: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Serialize `frame` as JSON and write it as one text frame.
    pub async fn send<T: Serialize>(&self, frame: &T) -> Result<(), SessionError> {
        let json = serde_json::to_string(frame)?;

        let mut sender = self.sender.lock().await;
        match sender.as_mut() {
            Some(sink) => sink
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| SessionError::Transport(e.to_string())),
            None => Err(SessionError::Closed),
        }
    }

    /// Block for the next data frame. Returns `Ok(None)` once the peer
    /// closes or the stream ends; control frames are skipped.
    pub async fn read(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut receiver = self.receiver.lock().await;
        let stream = match receiver.as_mut() {
            Some(stream) => stream,
            None => return Ok(None),
        };

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Some(bytes.to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SessionError::Transport(e.to_string())),
            }
        }
    }

    /// Idempotent, fatal close: sends a close frame and drops the send
    /// half. Later sends fail with `Closed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut sender = self.sender.lock().await;
        if let Some(mut sink) = sender.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
