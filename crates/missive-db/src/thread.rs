//! Reply-tree reconstruction.
//!
//! The whole subtree is fetched with one recursive query, then linked in
//! memory with an explicit worklist, so neither query count nor call-stack
//! depth grows with the shape of the thread.

use std::collections::{HashMap, VecDeque};

use missive_types::models::{MessageId, ThreadNode};
use tracing::debug;

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::{parse_ts, parse_uuid};

struct ThreadRow {
    id: MessageId,
    sender_id: String,
    sender: String,
    receiver_id: String,
    receiver: String,
    content: String,
    timestamp: String,
    parent_id: Option<MessageId>,
}

impl Database {
    pub fn get_thread(&self, root_id: MessageId) -> Result<ThreadNode> {
        let rows = self.with_conn(|conn| {
            // UNION (not UNION ALL) also stops on a cycle, should one exist.
            let mut stmt = conn.prepare(
                "WITH RECURSIVE thread(id) AS (
                     SELECT id FROM messages WHERE id = ?1
                     UNION
                     SELECT m.id FROM messages m JOIN thread t ON m.parent_id = t.id
                 )
                 SELECT m.id, m.sender_id, s.username, m.receiver_id, r.username,
                        m.content, m.timestamp, m.parent_id
                 FROM thread t
                 JOIN messages m ON m.id = t.id
                 JOIN users s ON s.id = m.sender_id
                 JOIN users r ON r.id = m.receiver_id
                 ORDER BY m.timestamp, m.id",
            )?;
            let rows = stmt
                .query_map([root_id], |row| {
                    Ok(ThreadRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender: row.get(2)?,
                        receiver_id: row.get(3)?,
                        receiver: row.get(4)?,
                        content: row.get(5)?,
                        timestamp: row.get(6)?,
                        parent_id: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        debug!(root_id, nodes = rows.len(), "thread rows fetched");
        assemble(root_id, rows)
    }
}

fn assemble(root_id: MessageId, rows: Vec<ThreadRow>) -> Result<ThreadNode> {
    let index: HashMap<MessageId, usize> =
        rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let root = *index
        .get(&root_id)
        .ok_or_else(|| StoreError::not_found("message", root_id))?;

    // Rows arrive in (timestamp, id) order, so each child list is already
    // sorted the way the tree must present it.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    for (i, row) in rows.iter().enumerate() {
        if i == root {
            continue;
        }
        if let Some(&p) = row.parent_id.as_ref().and_then(|p| index.get(p)) {
            children[p].push(i);
        }
    }

    // Breadth-first order from the root: every parent precedes its children.
    let mut order = Vec::with_capacity(rows.len());
    let mut frontier = VecDeque::from([root]);
    while let Some(i) = frontier.pop_front() {
        order.push(i);
        frontier.extend(children[i].iter().copied());
    }

    // Build bottom-up: walking the order backwards, all children of a node
    // are finished before the node itself.
    let mut rows: Vec<Option<ThreadRow>> = rows.into_iter().map(Some).collect();
    let mut built: Vec<Option<ThreadNode>> = (0..rows.len()).map(|_| None).collect();
    for &i in order.iter().rev() {
        let row = rows[i]
            .take()
            .ok_or_else(|| StoreError::Corrupt(format!("thread row {} visited twice", i)))?;
        let kids = children[i]
            .iter()
            .map(|&c| {
                built[c]
                    .take()
                    .ok_or_else(|| StoreError::Corrupt(format!("reply {} unresolved", c)))
            })
            .collect::<Result<Vec<_>>>()?;

        built[i] = Some(ThreadNode {
            id: row.id,
            sender_id: parse_uuid(&row.sender_id)?,
            sender: row.sender,
            receiver_id: parse_uuid(&row.receiver_id)?,
            receiver: row.receiver,
            content: row.content,
            timestamp: parse_ts(&row.timestamp)?,
            children: kids,
        });
    }

    built[root]
        .take()
        .ok_or_else(|| StoreError::not_found("message", root_id))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::StoreError;
    use crate::test_support::{alice_and_bob, db_with_clock};

    #[test]
    fn leaf_thread_has_no_children() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let m = db.create_message(a, b, "alone", None).unwrap();

        let t = db.get_thread(m.id).unwrap();
        assert_eq!(t.id, m.id);
        assert_eq!(t.sender, "alice");
        assert_eq!(t.receiver, "bob");
        assert!(t.children.is_empty());
    }

    #[test]
    fn missing_root() {
        let (db, _clock) = db_with_clock();
        assert!(matches!(db.get_thread(7), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn children_sorted_by_timestamp_then_id() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let root = db.create_message(a, b, "root", None).unwrap();

        clock.advance(Duration::seconds(10));
        let late = db.create_message(b, a, "late", Some(root.id)).unwrap();

        // Same instant as each other, earlier than `late`.
        clock.advance(Duration::seconds(-5));
        let tie1 = db.create_message(b, a, "tie1", Some(root.id)).unwrap();
        let tie2 = db.create_message(a, b, "tie2", Some(root.id)).unwrap();

        clock.advance(Duration::seconds(20));
        let deep = db.create_message(a, b, "deep", Some(tie2.id)).unwrap();

        let t = db.get_thread(root.id).unwrap();
        let level1: Vec<_> = t.children.iter().map(|c| c.id).collect();
        assert_eq!(level1, vec![tie1.id, tie2.id, late.id]);
        assert_eq!(t.children[1].children[0].id, deep.id);
        assert_eq!(t.reply_count(), 4);

        // A subtree resolves on its own.
        let sub = db.get_thread(tie2.id).unwrap();
        assert_eq!(sub.ids(), vec![tie2.id, deep.id]);
    }

    #[test]
    fn reply_count_matches_descendants() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let root = db.create_message(a, b, "root", None).unwrap();
        let other = db.create_message(a, b, "other root", None).unwrap();
        db.create_message(b, a, "elsewhere", Some(other.id)).unwrap();

        let mut parents = vec![root.id];
        for i in 0..40 {
            clock.advance(Duration::milliseconds(1));
            let parent = parents[i % parents.len()];
            let m = db.create_message(b, a, &format!("r{i}"), Some(parent)).unwrap();
            parents.push(m.id);
        }

        let t = db.get_thread(root.id).unwrap();
        assert_eq!(t.reply_count(), 40);

        // Every level is in ascending timestamp order.
        let mut stack = vec![&t];
        while let Some(node) = stack.pop() {
            assert!(node.children.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            stack.extend(node.children.iter());
        }
    }

    #[test]
    fn wide_thread() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let root = db.create_message(a, b, "root", None).unwrap();
        for i in 0..2_000 {
            db.create_message(b, a, &format!("r{i}"), Some(root.id)).unwrap();
        }

        let t = db.get_thread(root.id).unwrap();
        assert_eq!(t.children.len(), 2_000);
        assert_eq!(t.depth(), 2);
        assert!(t.children.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let root = db.create_message(a, b, "root", None).unwrap();
        let mut parent = root.id;
        for i in 0..5_000 {
            clock.advance(Duration::milliseconds(1));
            parent = db.create_message(b, a, &format!("r{i}"), Some(parent)).unwrap().id;
        }

        let t = db.get_thread(root.id).unwrap();
        assert_eq!(t.depth(), 5_001);
        assert_eq!(t.reply_count(), 5_000);
    }
}
