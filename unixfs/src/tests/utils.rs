use std::sync::Arc;

use cid::Cid;
use futures::future::BoxFuture;
use tokio::io::AsyncReadExt;

use crate::blockservice::BlockService;
use crate::node::Node;
use crate::reader::DagReader;

/// Reads the whole file DAG rooted at `cid`.
pub async fn read_all(block_service: &Arc<dyn BlockService>, cid: &Cid) -> Vec<u8> {
    let mut r = DagReader::new(block_service.clone(), cid)
        .await
        .expect("must open");
    let mut buf = Vec::new();
    r.read_to_end(&mut buf).await.expect("must read");

    assert_eq!(r.size(), buf.len() as u64, "size must match contents");
    buf
}

/// Visits every node of the file DAG rooted at `cid`, returning (height,
/// number of children) for each. Leaves have height 0.
pub async fn node_heights(
    block_service: &Arc<dyn BlockService>,
    cid: &Cid,
) -> Vec<(usize, usize)> {
    let mut out = vec![];
    visit(block_service, *cid, &mut out).await;
    out
}

fn visit<'a>(
    block_service: &'a Arc<dyn BlockService>,
    cid: Cid,
    out: &'a mut Vec<(usize, usize)>,
) -> BoxFuture<'a, usize> {
    Box::pin(async move {
        match Node::fetch(block_service, &cid).await.expect("must fetch") {
            Node::File(file) => {
                let children: Vec<Cid> = file.children().map(|(link, _)| link.cid).collect();
                let mut height = 0;
                for child in children.iter() {
                    height = height.max(visit(block_service, *child, out).await + 1);
                }
                out.push((height, children.len()));
                height
            }
            Node::Raw(_) => {
                out.push((0, 0));
                0
            }
            other => panic!("unexpected {} in file dag", other.kind()),
        }
    })
}

/// Length of the longest path from the root to a leaf.
pub async fn dag_depth(block_service: &Arc<dyn BlockService>, cid: &Cid) -> usize {
    node_heights(block_service, cid)
        .await
        .into_iter()
        .map(|(height, _)| height)
        .max()
        .unwrap_or_default()
}
