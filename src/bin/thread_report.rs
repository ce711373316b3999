//! Reads saved `mu find --threads --format=sexp` output from a file (or
//! stdin) and prints thread statistics.

use std::collections::HashMap;
use std::io::Read;

use anyhow::{Context, Result};

use mutag::index::parse_records;
use mutag::mail::{TagHeader, collect_thread_data, group_by_root};

fn main() -> Result<()> {
    let mut raw = String::new();
    match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            raw = std::fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?;
        }
        _ => {
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Reading stdin")?;
        }
    }

    let mut messages = parse_records(&raw, &TagHeader::default())?;
    collect_thread_data(&mut messages);
    let threads = group_by_root(&messages);

    println!("Total messages: {}", messages.len());
    println!(
        "With thread path: {}",
        messages.iter().filter(|m| m.thread.is_some()).count()
    );
    println!("Threads: {}", threads.len());

    let mut sizes: Vec<(usize, &str)> = threads
        .values()
        .map(|members| (members.len(), messages[members[0]].subject.as_str()))
        .collect();
    sizes.sort_by(|a, b| b.0.cmp(&a.0));

    println!("\nThread size distribution:");
    for (label, lo, hi) in [
        ("Single message threads", 1, 1),
        ("2-5 messages", 2, 5),
        ("6-10 messages", 6, 10),
        ("11-50 messages", 11, 50),
        ("50+ messages", 51, usize::MAX),
    ] {
        let n = sizes.iter().filter(|(s, _)| *s >= lo && *s <= hi).count();
        println!("  {label}: {n}");
    }

    println!("\nTop 20 largest threads:");
    for (i, (size, subject)) in sizes.iter().take(20).enumerate() {
        let subject = if subject.is_empty() { "(no subject)" } else { subject };
        let truncated: String = subject.chars().take(50).collect();
        println!("  {:2}. {:4} msgs - {}", i + 1, size, truncated);
    }

    println!("\n--- Checking for issues ---");
    let mut message_ids: HashMap<&str, usize> = HashMap::new();
    for msg in messages.iter().filter(|m| !m.message_id.is_empty()) {
        *message_ids.entry(msg.message_id.as_str()).or_default() += 1;
    }
    let duplicates: Vec<_> = message_ids.iter().filter(|&(_, n)| *n > 1).collect();
    println!("Duplicate message-ids: {}", duplicates.len());
    for (mid, n) in duplicates.iter().take(5) {
        let shown: String = mid.chars().take(60).collect();
        println!("  {shown} appears {n} times");
    }

    let no_mid = messages.iter().filter(|m| m.message_id.is_empty()).count();
    println!("Messages without message-id: {no_mid}");

    let gapped = messages
        .iter()
        .filter(|m| m.has_thread_data() && m.thread_root().is_empty())
        .count();
    println!("Threads rooted at a message without message-id: {gapped}");

    Ok(())
}
