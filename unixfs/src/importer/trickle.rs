//! The trickle layout is optimized for reading from the start, and for
//! appending.
//!
//! Every node first holds up to `max_links` leaves. After those follow
//! `depth_repeat` subtrees of depth 1, then `depth_repeat` subtrees of
//! depth 2, and so on. A subtree of depth `d` is laid out the same way, but
//! stops after its subtrees of depth `d - 1`. The root has no such limit.
//!
//! As subtrees left of the last one are complete, appending data only needs
//! to reopen the rightmost subtree at each depth.
use cid::Cid;
use futures::future::BoxFuture;
use tracing::{debug, instrument};

use super::{BuiltNode, DagBuilderHelper};
use crate::blockservice::BlockService;
use crate::node::{FileNode, Link, Node};
use crate::proto::DataType;
use crate::Error;

/// Builds a trickle DAG over all chunks of `db`, returning its root.
#[instrument(skip_all, fields(max_links = db.max_links()), err)]
pub async fn layout<BS: BlockService>(mut db: DagBuilderHelper<'_, BS>) -> Result<BuiltNode, Error> {
    if db.is_done().await? {
        return db.new_empty_root().await;
    }

    let root = fill_trickle_rec(&mut db, FileNode::new(DataType::File), None).await?;
    let built = db.commit(&root).await?;

    debug!(cid = %built.cid, file_size = built.file_size, "built trickle dag");
    Ok(built)
}

/// Appends the chunks of `db` to the trickle DAG rooted at `base`, and
/// returns the new root.
///
/// If `base` was built from a whole number of chunks with the same
/// parameters, the result is the same as building over the concatenated
/// input.
#[instrument(skip(db), fields(max_links = db.max_links()), err)]
pub async fn append<BS: BlockService>(
    mut db: DagBuilderHelper<'_, BS>,
    base: &Cid,
) -> Result<BuiltNode, Error> {
    let root = match db.fetch(base).await? {
        Node::File(root) => root,
        // a bare raw leaf becomes the first leaf of a new root.
        Node::Raw(data) => {
            let file_size = data.len() as u64;
            if db.is_done().await? {
                return Ok(BuiltNode {
                    cid: *base,
                    file_size,
                    tsize: file_size,
                });
            }

            let mut root = FileNode::new(DataType::File);
            if file_size > 0 {
                root.add_child(Link::new(None, *base, file_size), file_size);
            }
            root
        }
        other => {
            return Err(Error::NotAFile {
                cid: *base,
                kind: other.kind(),
            })
        }
    };

    let root = append_rec(&mut db, root, None).await?;
    let built = db.commit(&root).await?;

    debug!(cid = %built.cid, file_size = built.file_size, "appended to trickle dag");
    Ok(built)
}

/// Fills `node` with leaves and subtrees of depth up to `max_depth`
/// (exclusive), or unbounded if `max_depth` is None.
fn fill_trickle_rec<'b, 'a: 'b, BS: BlockService + 'b>(
    db: &'b mut DagBuilderHelper<'a, BS>,
    mut node: FileNode,
    max_depth: Option<usize>,
) -> BoxFuture<'b, Result<FileNode, Error>> {
    Box::pin(async move {
        db.fill_node_layer(&mut node, DataType::Raw).await?;

        let mut depth = 1;
        while max_depth.map_or(true, |max| depth < max) {
            if db.is_done().await? {
                break;
            }

            for _ in 0..db.params().depth_repeat {
                if db.is_done().await? {
                    break;
                }
                add_subtree(db, &mut node, depth).await?;
            }

            depth += 1;
        }

        Ok(node)
    })
}

/// Builds a subtree of the given depth and appends it to `node`.
async fn add_subtree<BS: BlockService>(
    db: &mut DagBuilderHelper<'_, BS>,
    node: &mut FileNode,
    depth: usize,
) -> Result<(), Error> {
    let child = fill_trickle_rec(db, FileNode::new(DataType::File), Some(depth)).await?;
    let child = db.commit(&child).await?;
    node.add_child(child.link(None), child.file_size);
    Ok(())
}

/// Continues filling an existing (possibly incomplete) node, as
/// [fill_trickle_rec] would have if the input had not ended.
fn append_rec<'b, 'a: 'b, BS: BlockService + 'b>(
    db: &'b mut DagBuilderHelper<'a, BS>,
    mut node: FileNode,
    max_depth: Option<usize>,
) -> BoxFuture<'b, Result<FileNode, Error>> {
    Box::pin(async move {
        let max_links = db.max_links();
        let depth_repeat = db.params().depth_repeat;

        if node.num_children() < max_links {
            db.fill_node_layer(&mut node, DataType::Raw).await?;
        } else if node.num_children() > max_links && !db.is_done().await? {
            // reopen the last subtree, it may be incomplete.
            let last_depth = (node.num_children() - max_links - 1) / depth_repeat + 1;

            if let Some((link, blocksize)) = node.pop_child() {
                let child = match db.fetch(&link.cid).await? {
                    Node::File(child) => child,
                    other => {
                        return Err(Error::corrupt(
                            &link.cid,
                            format!("unexpected {} in trickle dag", other.kind()),
                        ))
                    }
                };

                let child = append_rec(db, child, Some(last_depth)).await?;
                if child.file_size() == blocksize {
                    // it was complete already.
                    node.add_child(link, blocksize);
                } else {
                    let child = db.commit(&child).await?;
                    node.add_child(child.link(None), child.file_size);
                }
            }
        }

        let subtrees = node.num_children().saturating_sub(max_links);
        let mut depth = subtrees / depth_repeat + 1;
        let mut repeat = subtrees % depth_repeat;

        while max_depth.map_or(true, |max| depth < max) {
            if db.is_done().await? {
                break;
            }

            while repeat < depth_repeat {
                if db.is_done().await? {
                    break;
                }
                add_subtree(db, &mut node, depth).await?;
                repeat += 1;
            }

            repeat = 0;
            depth += 1;
        }

        Ok(node)
    })
}
