//! relay protocol - Line-oriented wire protocol
//!
//! Every message in either direction is one newline-terminated line of text.
//! This crate renders the server's lines, classifies the client's lines and
//! handles line framing; it performs no I/O itself.

pub mod framing;
pub mod line;

pub use framing::{decode_line, encode_line, FrameError, MAX_LINE_BYTES};
pub use line::{ClientLine, ServerLine, BYE_SENTINEL};
