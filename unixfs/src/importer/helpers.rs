use std::io;

use bytes::Bytes;
use cid::Cid;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{DagBuilderParams, LeafPolicy, BLOCK_SIZE_LIMIT};
use crate::blockservice::{Block, BlockService};
use crate::digests::{DAG_PB, RAW};
use crate::node::{FileNode, Link, Node};
use crate::proto::DataType;
use crate::utils::cancellable;
use crate::Error;

/// A node that has been written to the block service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltNode {
    pub cid: Cid,
    /// Number of file bytes below this node.
    pub file_size: u64,
    /// Cumulative serialized size of this node and everything below it.
    pub tsize: u64,
}

impl BuiltNode {
    pub fn link(&self, name: Option<String>) -> Link {
        Link::new(name, self.cid, self.tsize)
    }
}

/// Produces the block for a single leaf holding `data`.
///
/// Depending on the leaf policy this is a raw block, or a dag-pb node of
/// type `data_type` with `data` inlined.
pub fn leaf_block(
    params: &DagBuilderParams,
    data: Bytes,
    data_type: DataType,
) -> Result<Block, Error> {
    if data.len() > BLOCK_SIZE_LIMIT {
        return Err(Error::BlockSizeLimitExceeded(data.len()));
    }

    let prefix = params.prefix();
    if params.raw_leaves() {
        Ok(Block::new(prefix.sum(RAW, &data)?, data))
    } else {
        let encoded = FileNode::with_data(data_type, data).encode();
        Ok(Block::new(prefix.sum(DAG_PB, &encoded)?, encoded))
    }
}

/// Drives a single DAG build: pulls chunks, turns them into leaves, and
/// writes finalized nodes to the block service.
pub struct DagBuilderHelper<'a, BS> {
    block_service: BS,
    params: DagBuilderParams,
    chunks: BoxStream<'a, io::Result<Bytes>>,

    /// The next chunk, if it was already pulled.
    next: Option<Bytes>,
    exhausted: bool,

    cancel: CancellationToken,
}

impl<'a, BS> DagBuilderHelper<'a, BS>
where
    BS: BlockService,
{
    pub(crate) fn new(
        block_service: BS,
        params: DagBuilderParams,
        chunks: BoxStream<'a, io::Result<Bytes>>,
    ) -> Self {
        Self {
            block_service,
            params,
            chunks,
            next: None,
            exhausted: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts pending chunk reads and block service calls once `token` is
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn params(&self) -> &DagBuilderParams {
        &self.params
    }

    pub fn max_links(&self) -> usize {
        self.params.max_links
    }

    async fn prepare_next(&mut self) -> Result<(), Error> {
        while self.next.is_none() && !self.exhausted {
            let chunks = &mut self.chunks;
            let chunk = cancellable(&self.cancel, async { Ok(chunks.next().await) }).await?;

            match chunk {
                // empty chunks carry no data, skip them.
                Some(chunk) => {
                    let chunk = chunk.map_err(Error::Io)?;
                    if !chunk.is_empty() {
                        self.next = Some(chunk);
                    }
                }
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    /// Returns whether all input has been consumed.
    pub async fn is_done(&mut self) -> Result<bool, Error> {
        self.prepare_next().await?;
        Ok(self.next.is_none())
    }

    /// Stores the next chunk as a leaf, or returns None if there is no more
    /// input.
    pub async fn new_leaf(&mut self, data_type: DataType) -> Result<Option<BuiltNode>, Error> {
        self.prepare_next().await?;
        let Some(data) = self.next.take() else {
            return Ok(None);
        };

        let file_size = data.len() as u64;
        let block = leaf_block(&self.params, data, data_type)?;
        let tsize = block.data().len() as u64;
        let cid = self.put(block).await?;

        trace!(%cid, file_size, "stored leaf");
        Ok(Some(BuiltNode {
            cid,
            file_size,
            tsize,
        }))
    }

    /// Stores the root of an empty file.
    pub async fn new_empty_root(&mut self) -> Result<BuiltNode, Error> {
        let block = match self.params.leaves {
            LeafPolicy::Raw => leaf_block(&self.params, Bytes::new(), DataType::File)?,
            LeafPolicy::Framed | LeafPolicy::RawBelowRoot => {
                let encoded = FileNode::new(DataType::File).encode();
                Block::new(self.params.prefix().sum(DAG_PB, &encoded)?, encoded)
            }
        };

        let tsize = block.data().len() as u64;
        let cid = self.put(block).await?;
        Ok(BuiltNode {
            cid,
            file_size: 0,
            tsize,
        })
    }

    /// Adds leaves to `node` until it holds `max_links` children or the
    /// input is exhausted.
    pub async fn fill_node_layer(
        &mut self,
        node: &mut FileNode,
        data_type: DataType,
    ) -> Result<(), Error> {
        while node.num_children() < self.params.max_links {
            match self.new_leaf(data_type).await? {
                Some(leaf) => node.add_child(leaf.link(None), leaf.file_size),
                None => break,
            }
        }
        Ok(())
    }

    /// Serializes `node` and writes it to the block service.
    pub async fn commit(&mut self, node: &FileNode) -> Result<BuiltNode, Error> {
        let encoded = node.encode();
        let cid = self.params.prefix().sum(DAG_PB, &encoded)?;
        let tsize = encoded.len() as u64 + node.children_size();

        self.put(Block::new(cid, encoded)).await?;

        debug!(%cid, children = node.num_children(), file_size = node.file_size(), "committed node");
        Ok(BuiltNode {
            cid,
            file_size: node.file_size(),
            tsize,
        })
    }

    async fn put(&mut self, block: Block) -> Result<Cid, Error> {
        cancellable(&self.cancel, self.block_service.put(block)).await
    }

    /// Retrieves and decodes an existing node.
    pub(crate) async fn fetch(&mut self, cid: &Cid) -> Result<Node, Error> {
        cancellable(&self.cancel, Node::fetch(&self.block_service, cid)).await
    }
}
