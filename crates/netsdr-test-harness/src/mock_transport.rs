//! Scripted [`Transport`] for deterministic client tests.
//!
//! [`MockTransport`] is a cheap handle over shared state: clone it, hand one
//! clone to the client, and inspect the other afterwards.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the client sends the stop command, reply with a NAK.
//! mock.expect(&[0x08, 0x00, 0x18, 0x00, 0x00, 0x01, 0x00, 0x00], &[0x02, 0x00]);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    /// Bytes the next `send()` must carry; `None` accepts anything.
    request: Option<Vec<u8>>,
    /// Reply for the following `receive()`; `None` makes it time out.
    response: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    expectations: VecDeque<Expectation>,
    /// Fallback reply used once the queue is empty.
    default_response: Option<Vec<u8>>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    connected: bool,
    connect_failure: Option<String>,
    connect_calls: Vec<(String, u16)>,
    close_count: usize,
    sent_log: Vec<Vec<u8>>,
}

/// A mock [`Transport`] with scripted replies.
///
/// Starts disconnected; `connect()` succeeds unless a failure was injected
/// with [`fail_next_connect`](Self::fail_next_connect). Each `send()` is
/// recorded and consumes the next expectation, whose response is returned by
/// the following `receive()`. An empty scripted response reads as 0 bytes.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Expect `request` on the next send and reply with `response`.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.state().expectations.push_back(Expectation {
            request: Some(request.to_vec()),
            response: Some(response.to_vec()),
        });
    }

    /// Expect `request` on the next send and let the following receive time out.
    pub fn expect_no_reply(&self, request: &[u8]) {
        self.state().expectations.push_back(Expectation {
            request: Some(request.to_vec()),
            response: None,
        });
    }

    /// Reply with `response` to any send once the expectation queue is empty.
    pub fn respond(&self, response: &[u8]) {
        self.state().default_response = Some(response.to_vec());
    }

    /// Make the next `connect()` fail with [`Error::Transport`].
    pub fn fail_next_connect(&self, reason: &str) {
        self.state().connect_failure = Some(reason.to_string());
    }

    /// Every frame passed to `send()`, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// `(host, port)` of every `connect()` call, including failed ones.
    pub fn connect_calls(&self) -> Vec<(String, u16)> {
        self.state().connect_calls.clone()
    }

    /// Number of `close()` calls made while connected.
    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Force the connected state, e.g. to simulate a dropped link.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let mut state = self.state();
        state.connect_calls.push((host.to_string(), port));

        if let Some(reason) = state.connect_failure.take() {
            return Err(Error::Transport(reason));
        }
        if state.connected {
            return Err(Error::AlreadyConnected);
        }
        state.connected = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        let response = match state.expectations.pop_front() {
            Some(expectation) => {
                if let Some(request) = &expectation.request {
                    if data != request.as_slice() {
                        return Err(Error::Protocol(format!(
                            "unexpected send data: expected {:02X?}, got {:02X?}",
                            request, data
                        )));
                    }
                }
                expectation.response
            }
            None => match &state.default_response {
                Some(response) => Some(response.clone()),
                None => {
                    return Err(Error::Protocol(
                        "no more expectations in mock transport".into(),
                    ));
                }
            },
        };

        state.pending_response = response;
        state.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        let Some(response) = state.pending_response.take() else {
            return Err(Error::Timeout);
        };

        let remaining = &response[state.response_cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);

        let cursor = state.response_cursor + n;
        if cursor < response.len() {
            state.response_cursor = cursor;
            state.pending_response = Some(response);
        } else {
            state.response_cursor = 0;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.connected {
            state.close_count += 1;
        }
        state.connected = false;
        state.pending_response = None;
        state.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
