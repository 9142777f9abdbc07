//! Common test utilities and helpers
//!
//! This module provides reusable test helpers to reduce code duplication
//! across integration tests.
#![allow(dead_code)]

use assert_cmd::Command;
use async_trait::async_trait;
use flume::{Receiver, Sender};
use live_toasts::connection::{Connection, Connector, Endpoint, Frame, FrameReader, FrameWriter, ProtocolOptions};
use live_toasts::errors::{AppError, AppResult};
use predicates::prelude::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::time::Instant;

/// Test command builder for the live-toasts CLI
pub struct TestCommand {
    cmd: Command,
}

impl TestCommand {
    pub fn new() -> Self {
        let cmd = Command::cargo_bin("live-toasts").expect("Failed to find live-toasts binary");
        Self { cmd }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.cmd.arg(arg.as_ref());
        }
        self
    }

    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.cmd.arg(arg.as_ref());
        self
    }

    /// Point the command at an isolated project directory
    pub fn project(mut self, dir: &TempDir) -> Self {
        self.cmd.arg("--project").arg(dir.path());
        self
    }

    pub fn stdin<S: AsRef<str>>(mut self, input: S) -> Self {
        self.cmd.write_stdin(input.as_ref());
        self
    }

    pub fn expect_success(mut self) -> TestAssertion {
        let assert = self.cmd.assert().success();
        TestAssertion { assert }
    }

    pub fn expect_failure(mut self) -> TestAssertion {
        let assert = self.cmd.assert().failure();
        TestAssertion { assert }
    }
}

impl Default for TestCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Test assertion wrapper with convenient methods
pub struct TestAssertion {
    assert: assert_cmd::assert::Assert,
}

impl TestAssertion {
    pub fn stdout_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stdout(predicate::str::contains(text.as_ref()));
        Self { assert }
    }

    pub fn stderr_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stderr(predicate::str::contains(text.as_ref()));
        Self { assert }
    }
}

/// Server side of one scripted in-memory connection
pub struct ServerSide {
    /// Frames pushed here arrive at the client; dropping it closes the connection
    pub to_client: Sender<Frame>,
    /// Frames the client wrote
    pub from_client: Receiver<Frame>,
}

impl ServerSide {
    pub fn push(&self, json: &str) {
        self.to_client.send(Frame::from(json)).expect("client reader gone");
    }
}

struct ChannelReader {
    inbound: Receiver<Frame>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read_frame(&mut self) -> AppResult<Option<Frame>> {
        Ok(self.inbound.recv_async().await.ok())
    }
}

struct ChannelWriter {
    outbound: Sender<Frame>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn write_frame(&mut self, frame: &Frame) -> AppResult<()> {
        self.outbound
            .send(frame.clone())
            .map_err(|_| AppError::ConnectionClosed)
    }

    async fn close(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Connector that hands out prepared in-memory sessions, then refuses
///
/// Every connect attempt is timestamped with the (possibly paused) Tokio
/// clock so backoff schedules can be checked.
#[derive(Default)]
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Connection>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one session for a future connect and return its server side
    pub fn add_session(&self) -> ServerSide {
        let (to_client, inbound) = flume::unbounded();
        let (outbound, from_client) = flume::unbounded();
        let connection = Connection {
            reader: Box::new(ChannelReader { inbound }),
            writer: Box::new(ChannelWriter { outbound }),
            protocol: Some("toasts.v1".to_string()),
        };
        self.sessions.lock().unwrap().push_back(connection);
        ServerSide { to_client, from_client }
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &Endpoint, _options: &ProtocolOptions) -> AppResult<Connection> {
        self.attempts.lock().unwrap().push(Instant::now());
        let session = self.sessions.lock().unwrap().pop_front();
        session.ok_or_else(|| AppError::transport(endpoint.to_string(), "connection refused"))
    }
}

pub fn notification_json(kind: &str, title: &str, message: &str) -> String {
    serde_json::json!({
        "type": "notification",
        "kind": kind,
        "title": title,
        "message": message,
    })
    .to_string()
}
