//! Decoded UnixFS nodes.
//!
//! Every block is decoded into exactly one [Node] variant by inspecting its
//! codec and, for dag-pb blocks, the type tag of the embedded UnixFS `Data`
//! message. Consumers match on [Node] exhaustively.
use std::fmt;

use bytes::Bytes;
use cid::Cid;
use ipld_dagpb::{PbLink, PbNode};
use prost::Message;
use tracing::instrument;

use crate::blockservice::{Block, BlockService};
use crate::digests::{DAG_PB, RAW};
use crate::proto::{self, DataType};
use crate::Error;

mod directory;
mod file;

pub use directory::{encode_symlink, validate_name, DirectoryNode, HamtShard, ShardEntry};
pub use file::FileNode;

/// A named or anonymous reference to another block, annotated with the
/// cumulative serialized size of the DAG below it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    pub name: Option<String>,
    pub cid: Cid,
    pub size: u64,
}

impl Link {
    pub fn new(name: Option<String>, cid: Cid, size: u64) -> Self {
        Self { name, cid, size }
    }
}

impl From<&PbLink> for Link {
    fn from(link: &PbLink) -> Self {
        Link::new(link.name.clone(), link.cid, link.size.unwrap_or_default())
    }
}

impl From<&Link> for PbLink {
    fn from(link: &Link) -> Self {
        PbLink {
            cid: link.cid,
            name: link.name.clone(),
            size: Some(link.size),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Raw,
    File,
    Directory,
    HamtShard,
    Symlink,
    Metadata,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Raw => "raw block",
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::HamtShard => "sharded directory",
            NodeKind::Symlink => "symlink",
            NodeKind::Metadata => "metadata node",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A raw leaf, the payload is the file content itself.
    Raw(Bytes),
    /// A dag-pb node of type File, or of type Raw (framed leaf).
    File(FileNode),
    Directory(DirectoryNode),
    HamtShard(HamtShard),
    /// Symlink, holding the (unvalidated) target.
    Symlink(Bytes),
    /// Deprecated metadata node, wrapping the node it describes as its
    /// first link.
    Metadata(Vec<Link>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Raw(_) => NodeKind::Raw,
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
            Node::HamtShard(_) => NodeKind::HamtShard,
            Node::Symlink(_) => NodeKind::Symlink,
            Node::Metadata(_) => NodeKind::Metadata,
        }
    }

    pub fn from_block(block: &Block) -> Result<Self, Error> {
        Self::decode(block.cid(), block.data())
    }

    /// Decodes the payload of the block identified by `cid`.
    pub fn decode(cid: &Cid, data: &Bytes) -> Result<Self, Error> {
        match cid.codec() {
            RAW => Ok(Node::Raw(data.clone())),
            DAG_PB => {
                let pb = PbNode::from_bytes(data.clone())
                    .map_err(|e| Error::corrupt(cid, format!("invalid dag-pb node: {e}")))?;
                let fsdata = pb
                    .data
                    .clone()
                    .ok_or_else(|| Error::corrupt(cid, "dag-pb node has no unixfs data"))?;
                let fsdata = proto::Data::decode(fsdata)
                    .map_err(|e| Error::corrupt(cid, format!("invalid unixfs data: {e}")))?;
                let links: Vec<Link> = pb.links.iter().map(Link::from).collect();

                match DataType::try_from(fsdata.r#type) {
                    Ok(data_type @ (DataType::Raw | DataType::File)) => {
                        FileNode::decode(cid, data_type, fsdata, links).map(Node::File)
                    }
                    Ok(DataType::Directory) => DirectoryNode::decode(cid, links).map(Node::Directory),
                    Ok(DataType::HamtShard) => HamtShard::decode(cid, fsdata, links).map(Node::HamtShard),
                    Ok(DataType::Symlink) => Ok(Node::Symlink(fsdata.data.unwrap_or_default())),
                    Ok(DataType::Metadata) => Ok(Node::Metadata(links)),
                    Err(_) => Err(Error::UnrecognizedType {
                        cid: *cid,
                        data_type: fsdata.r#type,
                    }),
                }
            }
            _ => Err(Error::UnsupportedCodec(*cid)),
        }
    }

    /// Retrieves the block from the block service, checks it against its
    /// digest and decodes it.
    #[instrument(skip(block_service), fields(cid = %cid), err)]
    pub async fn fetch<BS: BlockService>(block_service: &BS, cid: &Cid) -> Result<Self, Error> {
        let block = block_service
            .get(cid)
            .await?
            .ok_or(Error::BlockNotFound(*cid))?;

        block.verify()?;
        Self::from_block(&block)
    }
}

/// Serializes a dag-pb node, links are sorted by name in the process.
pub(crate) fn encode_pb(links: &[Link], data: proto::Data) -> Bytes {
    let node = PbNode {
        links: links.iter().map(PbLink::from).collect(),
        data: Some(data.encode_to_vec().into()),
    };

    Bytes::copy_from_slice(&node.into_bytes())
}
