pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod mail;
pub mod mutag;
pub mod output;
pub mod rules;
pub mod tagging;

pub use error::{Error, Result};
pub use mutag::{Invocation, Mutag, QueryRequest, RunSummary};
