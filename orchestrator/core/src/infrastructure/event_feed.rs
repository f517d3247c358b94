// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Feed - non-blocking source of control-plane events
//
// The production feed runs the configured event command (by default
// `salt-run state.event pretty=False`) and parses one event per output line.
// Lines look like `<tag>\t<json payload>`; a bare JSON object carrying `tag`
// and `data` is accepted too.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use crate::domain::events::ControlPlaneEvent;

#[derive(Debug, Error)]
pub enum EventFeedError {
    /// The feed will never produce another event
    #[error("Event feed is closed")]
    Closed,

    /// The feed lost its source; a later poll may reconnect
    #[error("Event feed disconnected: {0}")]
    Disconnected(String),

    #[error("Event feed I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A source of control-plane events.
#[async_trait]
pub trait EventFeed: Send {
    /// Return the next event if one is ready, `Ok(None)` if nothing arrived
    /// within the feed's polling window.
    async fn poll_event(&mut self) -> Result<Option<ControlPlaneEvent>, EventFeedError>;
}

/// Streams events from a long-running command's stdout.
pub struct CommandEventFeed {
    command: Vec<String>,
    poll_window: Duration,
    child: Option<Child>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
}

impl CommandEventFeed {
    pub fn new(command: Vec<String>, poll_window: Duration) -> Self {
        Self {
            command,
            poll_window,
            child: None,
            lines: None,
        }
    }

    fn connect(&mut self) -> Result<(), EventFeedError> {
        let (program, args) = self.command.split_first().ok_or(EventFeedError::Closed)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EventFeedError::Disconnected("event command has no stdout".to_string()))?;

        info!(command = %self.command.join(" "), pid = ?child.id(), "Connected to control-plane event stream");
        self.lines = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        Ok(())
    }

    fn reset(&mut self) {
        self.lines = None;
        // kill_on_drop reaps the old stream process
        self.child = None;
    }
}

#[async_trait]
impl EventFeed for CommandEventFeed {
    async fn poll_event(&mut self) -> Result<Option<ControlPlaneEvent>, EventFeedError> {
        if self.lines.is_none() {
            self.connect()?;
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        match tokio::time::timeout(self.poll_window, lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let event = parse_event_line(&line);
                if event.is_none() && !line.trim().is_empty() {
                    debug!(line = %line, "Skipping unparseable event line");
                }
                Ok(event)
            }
            Ok(Ok(None)) => {
                self.reset();
                Err(EventFeedError::Disconnected("event stream ended".to_string()))
            }
            Ok(Err(e)) => {
                self.reset();
                Err(EventFeedError::Io(e))
            }
        }
    }
}

/// Parse one line of event-stream output.
pub fn parse_event_line(line: &str) -> Option<ControlPlaneEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        return serde_json::from_str::<ControlPlaneEvent>(line).ok();
    }

    let (tag, payload) = line.split_once(char::is_whitespace)?;
    let data: Value = serde_json::from_str(payload.trim()).ok()?;
    Some(ControlPlaneEvent::new(tag, data))
}
