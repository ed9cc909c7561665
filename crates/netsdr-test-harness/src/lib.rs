//! netsdr-test-harness: Mock transports and scripted servers for testing
//! the NetSDR client.
//!
//! [`MockTransport`] drives the device client deterministically without a
//! network; [`MockTcpServer`] plays the device on a loopback TCP socket for
//! tests that go through the real `TcpTransport`.

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::MockTransport;
