use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::types::{Message, ThreadData};

/// One node of the thread tree. Nodes live in a flat arena and refer to
/// each other by index; a parent is always created before its children.
#[derive(Debug, Default)]
struct Node {
    parent: Option<usize>,
    /// Messages attached at this path (normally zero or one).
    messages: Vec<usize>,
    /// Shallowest node on the way down from the top holding a message.
    root: Option<usize>,
    emails: BTreeSet<String>,
    tags: BTreeSet<String>,
}

/// Fill in thread emails, tags and root for every message carrying a
/// thread path.
///
/// Messages are placed in a tree keyed by their path segments. Emails and
/// tags are gathered bottom-up into every node, then each message receives
/// the aggregate of its thread root: the shallowest ancestor (itself
/// included) that holds a message. Messages without a thread path keep
/// their own values.
pub fn collect_thread_data(messages: &mut [Message]) {
    // 1. Build the tree; node 0 is the top and never holds a message
    let mut nodes = vec![Node::default()];
    let mut edges: HashMap<(usize, &str), usize> = HashMap::new();

    for (i, msg) in messages.iter().enumerate() {
        let Some(ref path) = msg.thread else {
            continue;
        };
        let mut current = 0;
        for segment in path {
            let parent = current;
            current = *edges.entry((parent, segment.as_str())).or_insert_with(|| {
                nodes.push(Node {
                    parent: Some(parent),
                    ..Default::default()
                });
                nodes.len() - 1
            });
        }
        if current != 0 {
            nodes[current].messages.push(i);
        }
    }
    drop(edges);

    if nodes.len() == 1 {
        return;
    }

    // 2. Roots, top-down (parents precede children in the arena)
    for n in 1..nodes.len() {
        let inherited = nodes[n].parent.and_then(|p| nodes[p].root);
        nodes[n].root = inherited.or(if nodes[n].messages.is_empty() {
            None
        } else {
            Some(n)
        });
    }

    // 3. Own data, then bottom-up aggregation into the parents
    for node in nodes.iter_mut() {
        for &i in &node.messages {
            node.emails.extend(messages[i].emails.iter().cloned());
            node.tags.extend(messages[i].tags.iter().cloned());
        }
    }
    for n in (1..nodes.len()).rev() {
        let Some(p) = nodes[n].parent else { continue };
        let (head, tail) = nodes.split_at_mut(n);
        let child = &tail[0];
        head[p].emails.extend(child.emails.iter().cloned());
        head[p].tags.extend(child.tags.iter().cloned());
    }

    // 4. Hand the root's aggregate to every message below it
    for node in &nodes {
        let Some(root) = node.root else { continue };
        if node.messages.is_empty() {
            continue;
        }
        let root_node = &nodes[root];
        let root_id = messages[root_node.messages[0]].message_id.clone();
        for &i in &node.messages {
            messages[i].set_thread_data(ThreadData {
                emails: root_node.emails.clone(),
                tags: root_node.tags.clone(),
                root: root_id.clone(),
            });
        }
    }
}

/// Message indices grouped by thread root, roots in sorted order.
pub fn group_by_root(messages: &[Message]) -> BTreeMap<String, Vec<usize>> {
    let mut threads: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, msg) in messages.iter().enumerate() {
        threads.entry(msg.thread_root().to_string()).or_default().push(i);
    }
    threads
}
