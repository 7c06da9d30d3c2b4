//! The balanced layout fills each node up to `max_links` children, and only
//! adds another level on top once the current root is full.
//!
//! ```text
//!                     +-------------+
//!                     |   Root 4    |
//!                     +-------------+
//!                           |
//!        +--------------------------+----------------------------+
//!        |                                                       |
//!  +-------------+                                         +-------------+
//!  |   Node 2    |                                         |   Node 5    |
//!  +-------------+                                         +-------------+
//!        |                                                       |
//!  +-------------+-------------+                           +-------------+
//!  |             |             |                           |             |
//! +--------+ +--------+   +--------+                   +--------+
//! | Leaf 1 | | Leaf 3 |   | Leaf n |                   | Leaf m |
//! +--------+ +--------+   +--------+                   +--------+
//! ```
//!
//! Nodes are kept open in a stack, one per depth. A node is only finalized
//! once another child arrives for a full node, or once the input ends.
use tracing::{debug, instrument};

use super::{BuiltNode, DagBuilderHelper, LeafPolicy};
use crate::blockservice::BlockService;
use crate::node::FileNode;
use crate::proto::DataType;
use crate::Error;

/// Builds a balanced DAG over all chunks of `db`, returning its root.
#[instrument(skip_all, fields(max_links = db.max_links()), err)]
pub async fn layout<BS: BlockService>(mut db: DagBuilderHelper<'_, BS>) -> Result<BuiltNode, Error> {
    // levels[0] collects leaves, levels[n] collects nodes of depth n.
    let mut levels: Vec<FileNode> = Vec::new();

    while let Some(leaf) = db.new_leaf(DataType::File).await? {
        push(&mut db, &mut levels, 0, leaf).await?;
    }

    if levels.is_empty() {
        return db.new_empty_root().await;
    }

    // A single leaf is its own root, unless the root must not be raw.
    if levels.len() == 1
        && levels[0].num_children() == 1
        && db.params().leaves != LeafPolicy::RawBelowRoot
    {
        if let Some((link, file_size)) = levels[0].children().next() {
            return Ok(BuiltNode {
                cid: link.cid,
                file_size,
                tsize: link.size,
            });
        }
    }

    // Finalize the open nodes bottom-up, each becoming the last child of the
    // level above.
    let mut depth = 0;
    loop {
        let node = std::mem::replace(&mut levels[depth], FileNode::new(DataType::File));
        let built = db.commit(&node).await?;

        if depth + 1 == levels.len() {
            debug!(cid = %built.cid, depth = levels.len(), file_size = built.file_size, "built balanced dag");
            return Ok(built);
        }

        push(&mut db, &mut levels, depth + 1, built).await?;
        depth += 1;
    }
}

/// Appends `child` to the open node at `depth`. If that node is full, it is
/// finalized and pushed one level up, and `child` starts a new node.
async fn push<BS: BlockService>(
    db: &mut DagBuilderHelper<'_, BS>,
    levels: &mut Vec<FileNode>,
    mut depth: usize,
    mut child: BuiltNode,
) -> Result<(), Error> {
    loop {
        if depth == levels.len() {
            levels.push(FileNode::new(DataType::File));
        }

        let level = &mut levels[depth];
        if level.num_children() < db.max_links() {
            level.add_child(child.link(None), child.file_size);
            return Ok(());
        }

        let full = std::mem::replace(level, FileNode::new(DataType::File));
        level.add_child(child.link(None), child.file_size);

        child = db.commit(&full).await?;
        depth += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::layout;
    use crate::chunker::size_splitter;
    use crate::digests::RAW;
    use crate::fixtures::pseudo_random_bytes;
    use crate::importer::{DagBuilderParams, LeafPolicy};
    use crate::node::Node;
    use crate::tests::utils::{dag_depth, read_all};
    use crate::utils::gen_block_service;

    fn params(max_links: usize, leaves: LeafPolicy) -> DagBuilderParams {
        DagBuilderParams {
            max_links,
            leaves,
            ..DagBuilderParams::v1()
        }
    }

    /// Depth grows only once the level below is full.
    #[rstest]
    #[case::one_leaf(1, 0)]
    #[case::two_leaves(2, 1)]
    #[case::full_root(4, 1)]
    #[case::overflow(5, 2)]
    #[case::full_depth_two(16, 2)]
    #[case::overflow_depth_two(17, 3)]
    #[tokio::test]
    async fn depth_for_leaf_count(#[case] leaves: usize, #[case] expected_depth: usize) {
        let block_service = gen_block_service();
        let data = pseudo_random_bytes(leaves as u64, leaves * 8);

        let db = params(4, LeafPolicy::Raw)
            .new_helper(block_service.clone(), size_splitter(Cursor::new(data.clone()), 8))
            .unwrap();
        let root = layout(db).await.expect("must build");

        assert_eq!(data.len() as u64, root.file_size);
        assert_eq!(expected_depth, dag_depth(&block_service, &root.cid).await);
        assert_eq!(data.to_vec(), read_all(&block_service, &root.cid).await);
    }

    /// The first children of the root are full subtrees, only the rightmost
    /// edge is partial.
    #[tokio::test]
    async fn full_left_subtrees() {
        let block_service = gen_block_service();
        let data = pseudo_random_bytes(0, 9 * 8);

        let db = params(4, LeafPolicy::Raw)
            .new_helper(block_service.clone(), size_splitter(Cursor::new(data.clone()), 8))
            .unwrap();
        let root = layout(db).await.expect("must build");

        let Node::File(root_node) = Node::fetch(&block_service, &root.cid).await.unwrap() else {
            panic!("root must be a file node");
        };
        let sizes: Vec<u64> = root_node.children().map(|(_, size)| size).collect();
        assert_eq!(vec![32, 32, 8], sizes);
    }

    #[rstest]
    #[case::raw(LeafPolicy::Raw, true)]
    #[case::raw_below_root(LeafPolicy::RawBelowRoot, false)]
    #[tokio::test]
    async fn single_leaf_root(#[case] leaves: LeafPolicy, #[case] bare: bool) {
        let block_service = gen_block_service();
        let db = params(4, leaves)
            .new_helper(
                block_service.clone(),
                size_splitter(Cursor::new(b"hello".to_vec()), 8),
            )
            .unwrap();
        let root = layout(db).await.expect("must build");

        assert_eq!(bare, root.cid.codec() == RAW);
        assert_eq!(5, root.file_size);
        assert_eq!(b"hello".to_vec(), read_all(&block_service, &root.cid).await);
    }
}
