use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

/// Message, history entry and notification ids are SQLite rowids, so they
/// grow with insertion order.
pub type MessageId = i64;
pub type HistoryId = i64;
pub type NotificationId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Full projection of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub receiver_id: Uuid,
    pub receiver_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited: bool,
    /// `None` when the message was never edited, or when the editor has
    /// since been deleted.
    pub edited_by: Option<Uuid>,
    pub parent_id: Option<MessageId>,
}

/// One row of a message's audit trail: the content as it was right before
/// an edit overwrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub message_id: MessageId,
    pub old_content: String,
    pub edited_at: DateTime<Utc>,
    pub edited_by: Option<Uuid>,
}

/// Unread listing row. Carries only what an inbox needs to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub notification_id: NotificationId,
    pub message_id: MessageId,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub receiver_id: Uuid,
    pub receiver_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub notified_at: DateTime<Utc>,
}

/// A message and its replies, nested. Leaves have an empty `children`.
///
/// On the wire a thread is flat (see [`ThreadListing`]); serde's derived
/// impls would recurse once per level and a long reply chain would exhaust
/// the stack.
#[derive(Debug)]
pub struct ThreadNode {
    pub id: MessageId,
    pub sender_id: Uuid,
    pub sender: String,
    pub receiver_id: Uuid,
    pub receiver: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub children: Vec<ThreadNode>,
}

/// Wire form of a thread: every node in pre-order, children in their
/// stored order, each pointing at its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadListing {
    pub root_id: MessageId,
    pub nodes: Vec<ThreadEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadEntry {
    pub id: MessageId,
    /// `None` only for the root.
    pub parent_id: Option<MessageId>,
    /// Distance from the root; the root is 0.
    pub depth: usize,
    pub sender_id: Uuid,
    pub sender: String,
    pub receiver_id: Uuid,
    pub receiver: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ThreadNode {
    /// Number of direct and indirect replies below this node.
    pub fn reply_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&ThreadNode> = vec![self];
        while let Some(node) = stack.pop() {
            count += node.children.len();
            stack.extend(node.children.iter());
        }
        count
    }

    /// Length of the longest root-to-leaf path, counting the root as 1.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(&ThreadNode, usize)> = vec![(self, 1)];
        while let Some((node, level)) = stack.pop() {
            max = max.max(level);
            stack.extend(node.children.iter().map(|c| (c, level + 1)));
        }
        max
    }

    /// Ids in pre-order, children visited in their stored order.
    pub fn ids(&self) -> Vec<MessageId> {
        let mut out = Vec::new();
        let mut stack: Vec<&ThreadNode> = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node.id);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

impl ThreadNode {
    pub fn to_listing(&self) -> ThreadListing {
        let mut nodes = Vec::new();
        let mut stack: Vec<(&ThreadNode, Option<MessageId>, usize)> = vec![(self, None, 0)];
        while let Some((node, parent_id, depth)) = stack.pop() {
            nodes.push(ThreadEntry {
                id: node.id,
                parent_id,
                depth,
                sender_id: node.sender_id,
                sender: node.sender.clone(),
                receiver_id: node.receiver_id,
                receiver: node.receiver.clone(),
                content: node.content.clone(),
                timestamp: node.timestamp,
            });
            stack.extend(node.children.iter().rev().map(|c| (c, Some(node.id), depth + 1)));
        }
        ThreadListing {
            root_id: self.id,
            nodes,
        }
    }

    /// Rebuilds the nested tree. Fails if the listing does not start at its
    /// root or an entry names a parent that does not precede it.
    pub fn from_listing(listing: ThreadListing) -> Result<Self, String> {
        let root_id = listing.root_id;
        match listing.nodes.first() {
            Some(first) if first.id == root_id && first.parent_id.is_none() => {}
            _ => return Err(format!("thread listing does not start at root {}", root_id)),
        }

        let mut index: HashMap<MessageId, usize> = HashMap::with_capacity(listing.nodes.len());
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); listing.nodes.len()];
        for (i, entry) in listing.nodes.iter().enumerate() {
            if i > 0 {
                let parent = entry
                    .parent_id
                    .and_then(|p| index.get(&p).copied())
                    .ok_or_else(|| format!("message {} has no preceding parent", entry.id))?;
                children[parent].push(i);
            }
            if index.insert(entry.id, i).is_some() {
                return Err(format!("message {} listed twice", entry.id));
            }
        }

        // Parents precede children, so building back to front finishes every
        // child before its parent.
        let mut built: Vec<Option<ThreadNode>> = (0..listing.nodes.len()).map(|_| None).collect();
        for (i, entry) in listing.nodes.into_iter().enumerate().rev() {
            let kids = children[i]
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();
            built[i] = Some(ThreadNode {
                id: entry.id,
                sender_id: entry.sender_id,
                sender: entry.sender,
                receiver_id: entry.receiver_id,
                receiver: entry.receiver,
                content: entry.content,
                timestamp: entry.timestamp,
                children: kids,
            });
        }

        built[0]
            .take()
            .ok_or_else(|| format!("thread listing does not start at root {}", root_id))
    }
}

impl Serialize for ThreadNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_listing().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ThreadNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let listing = ThreadListing::deserialize(deserializer)?;
        ThreadNode::from_listing(listing).map_err(de::Error::custom)
    }
}

// The derived drop glue recurses once per level, which overflows the stack
// on long reply chains. Flatten the subtree onto the heap instead.
impl Drop for ThreadNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: MessageId) -> ThreadNode {
        ThreadNode {
            id,
            sender_id: Uuid::nil(),
            sender: "a".into(),
            receiver_id: Uuid::nil(),
            receiver: "b".into(),
            content: format!("m{}", id),
            timestamp: DateTime::default(),
            children: vec![],
        }
    }

    #[test]
    fn counts_and_depth() {
        let mut root = leaf(1);
        let mut mid = leaf(2);
        mid.children.push(leaf(4));
        root.children.push(mid);
        root.children.push(leaf(3));

        assert_eq!(root.reply_count(), 3);
        assert_eq!(root.depth(), 3);
        assert_eq!(root.ids(), vec![1, 2, 4, 3]);
        assert_eq!(leaf(9).reply_count(), 0);
        assert_eq!(leaf(9).depth(), 1);
    }

    #[test]
    fn dropping_a_long_chain_does_not_overflow() {
        let mut node = leaf(200_000);
        for id in (1..200_000).rev() {
            let mut parent = leaf(id);
            parent.children.push(node);
            node = parent;
        }
        assert_eq!(node.depth(), 200_000);
        drop(node);
    }

    #[test]
    fn serializes_flat_in_pre_order() {
        let mut root = leaf(1);
        let mut mid = leaf(2);
        mid.children.push(leaf(4));
        root.children.push(mid);
        root.children.push(leaf(3));

        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["root_id"], 1);
        let nodes = json["nodes"].as_array().unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
        assert!(nodes[0]["parent_id"].is_null());
        assert_eq!(nodes[2]["parent_id"], 2);
        assert_eq!(nodes[2]["depth"], 2);

        let back: ThreadNode = serde_json::from_value(json).unwrap();
        assert_eq!(back.ids(), vec![1, 2, 4, 3]);
        assert_eq!(back.children[0].children[0].content, "m4");
    }

    #[test]
    fn long_chain_serializes_without_recursion() {
        let mut node = leaf(100_000);
        for id in (1..100_000).rev() {
            let mut parent = leaf(id);
            parent.children.push(node);
            node = parent;
        }

        let json = serde_json::to_string(&node).unwrap();
        let back: ThreadNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.depth(), 100_000);
        assert_eq!(back.reply_count(), 99_999);
    }

    #[test]
    fn rejects_malformed_listing() {
        let mut listing = leaf(1).to_listing();
        let mut orphan = leaf(2).to_listing().nodes.remove(0);
        orphan.parent_id = Some(99);
        listing.nodes.push(orphan);
        assert!(ThreadNode::from_listing(listing).is_err());

        let empty = ThreadListing { root_id: 1, nodes: vec![] };
        assert!(ThreadNode::from_listing(empty).is_err());
    }
}
