//! Access to the external full-text index.

pub mod mu;
mod records;
pub mod sexp;

pub use mu::{FindOutput, FindRequest, MailIndex, MuIndex};
pub use records::parse_records;

use tracing::debug;

use crate::error::Result;
use crate::mail::{Message, TagHeader};

/// Runs one index query and converts its output into messages.
///
/// The "no results" condition yields an empty list.
pub fn find_messages(
    index: &dyn MailIndex,
    request: &FindRequest,
    tags_header: &TagHeader,
) -> Result<Vec<Message>> {
    match index.find(request)? {
        FindOutput::NoResults => Ok(Vec::new()),
        FindOutput::Records(raw) => {
            let messages = parse_records(&raw, tags_header)?;
            debug!(count = messages.len(), "Parsed index records");
            Ok(messages)
        }
    }
}
