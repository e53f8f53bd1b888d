//! IPC bridge for supervisor-store communication.
//!
//! This module provides the wire protocol and codecs for communication between
//! the supervisor (parent) and the store subprocess.
//!
//! # Architecture
//!
//! - **protocol**: Message types (Request, Reply) and sentinel constants
//! - **codec**: Line framing codecs for AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
