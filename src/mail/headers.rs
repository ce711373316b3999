//! Byte-level access to the RFC 2822 header block of a message file.
//!
//! Everything here works on raw bytes so that bodies in unknown charsets,
//! CRLF line endings and unrelated headers survive a rewrite untouched.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Returns the offset of the blank line that ends the header block, if any.
pub fn header_end(content: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos < content.len() {
        let rest = &content[pos..];
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            return None;
        };
        let line = &rest[..=nl];
        if line == b"\n" || line == b"\r\n" {
            return Some(pos);
        }
        pos += nl + 1;
    }
    None
}

/// Start/end offsets of each line, terminator included.
fn line_spans(block: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while pos < block.len() {
        let end = block[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(block.len(), |nl| pos + nl + 1);
        spans.push((pos, end));
        pos = end;
    }
    spans
}

fn is_continuation(line: &[u8]) -> bool {
    matches!(line.first(), Some(b' ' | b'\t'))
}

fn starts_header(line: &[u8], name: &str) -> bool {
    let name = name.as_bytes();
    line.len() > name.len() && line.starts_with(name) && line[name.len()] == b':'
}

/// Finds the header `name` (exact case) and the line range it covers,
/// continuation lines included.
fn find_header(spans: &[(usize, usize)], block: &[u8], name: &str) -> Option<(usize, usize)> {
    let first = spans
        .iter()
        .position(|&(s, e)| starts_header(&block[s..e], name))?;
    let mut last = first + 1;
    while last < spans.len() && is_continuation(&block[spans[last].0..spans[last].1]) {
        last += 1;
    }
    Some((first, last))
}

/// Unfolded value of header `name`, looked up with an exact case match.
pub fn get_header(content: &[u8], name: &str) -> Option<String> {
    let block = &content[..header_end(content).unwrap_or(content.len())];
    let spans = line_spans(block);
    let (first, last) = find_header(&spans, block, name)?;

    let mut value = String::new();
    for (i, &(s, e)) in spans[first..last].iter().enumerate() {
        let line = if i == 0 {
            &block[s + name.len() + 1..e]
        } else {
            &block[s..e]
        };
        let part = String::from_utf8_lossy(line);
        let part = part.trim();
        if !part.is_empty() {
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(part);
        }
    }
    Some(value)
}

/// Replaces the value of header `name`, or appends the header at the end
/// of the header block when it is missing. Bytes outside the affected
/// header lines are copied verbatim.
pub fn set_header(content: &[u8], name: &str, value: &str) -> Vec<u8> {
    let block_end = header_end(content).unwrap_or(content.len());
    let block = &content[..block_end];
    let spans = line_spans(block);

    let eol: &[u8] = match spans.first() {
        Some(&(s, e)) if block[s..e].ends_with(b"\r\n") => b"\r\n",
        _ => b"\n",
    };

    let value: String = value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    let mut line = format!("{}: {}", name, value.trim()).trim_end().to_string().into_bytes();
    line.extend_from_slice(eol);

    let mut out = Vec::with_capacity(content.len() + line.len());
    match find_header(&spans, block, name) {
        Some((first, last)) => {
            out.extend_from_slice(&content[..spans[first].0]);
            out.extend_from_slice(&line);
            out.extend_from_slice(&content[spans[last - 1].1..]);
        }
        None => {
            out.extend_from_slice(block);
            if !block.is_empty() && !block.ends_with(b"\n") {
                out.extend_from_slice(eol);
            }
            out.extend_from_slice(&line);
            out.extend_from_slice(&content[block_end..]);
        }
    }
    out
}

/// Reads the header block of a file, stopping at the first blank line.
pub fn read_header_block(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut block = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line == b"\n" || line == b"\r\n" {
            break;
        }
        block.extend_from_slice(&line);
    }

    Ok(block)
}
