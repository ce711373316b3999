//! Messages stored in a maildir and the operations that mutate them.

pub mod headers;
pub mod maildir;
mod message;
pub mod mtime;
pub mod threading;
mod types;

pub use threading::{collect_thread_data, group_by_root};
pub use types::{Address, Flag, Flags, Message, TagHeader, ThreadData};

#[cfg(test)]
pub(crate) use message::tests::{SAMPLE, maildir_with};
