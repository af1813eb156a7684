//! Programmer wire protocol.

pub mod command;
pub mod line;

pub use command::{ACK_OK, Acknowledgment, Command, ERASE_TAG, READY_TOKEN, WRITE_TAG};
pub use line::read_line;
