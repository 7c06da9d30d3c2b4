use std::io;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::DagBuilderHelper;
use crate::blockservice::BlockService;
use crate::digests::{CidVersion, HashFunction, Prefix};
use crate::Error;

/// Number of links that fit into an 8KiB block, at roughly 47 bytes per
/// link.
pub const DEFAULT_LINKS_PER_BLOCK: usize = 8192 / 47;

/// Number of subtrees of each depth the trickle layout adds before going one
/// level deeper.
pub const DEFAULT_DEPTH_REPEAT: usize = 4;

/// How leaves are encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafPolicy {
    /// Leaves are dag-pb nodes carrying the chunk as inline data.
    #[default]
    Framed,
    /// Leaves are raw blocks. A file consisting of a single chunk is a bare
    /// raw block.
    Raw,
    /// Leaves are raw blocks, but the root is always a dag-pb file node.
    RawBelowRoot,
}

/// Parameters of a DAG build. Two builds over the same bytes with equal
/// parameters produce the same root CID.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DagBuilderParams {
    /// Maximum number of links per node (of the balanced layout, and of
    /// each leaf run of the trickle layout).
    pub max_links: usize,
    pub cid_version: CidVersion,
    pub hash_function: HashFunction,
    pub leaves: LeafPolicy,
    /// Subtrees per depth in the trickle layout.
    pub depth_repeat: usize,
}

impl Default for DagBuilderParams {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_LINKS_PER_BLOCK,
            cid_version: CidVersion::V0,
            hash_function: HashFunction::Sha2_256,
            leaves: LeafPolicy::Framed,
            depth_repeat: DEFAULT_DEPTH_REPEAT,
        }
    }
}

impl DagBuilderParams {
    /// CIDv1 with raw leaves, the usual choice for new data.
    pub fn v1() -> Self {
        Self {
            cid_version: CidVersion::V1,
            leaves: LeafPolicy::Raw,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_links < 2 {
            return Err(Error::InvalidConfig(format!(
                "max_links must be at least 2, got {}",
                self.max_links
            )));
        }
        if self.depth_repeat == 0 {
            return Err(Error::InvalidConfig(
                "depth_repeat must be positive".to_string(),
            ));
        }
        if self.cid_version == CidVersion::V0 {
            if self.hash_function != HashFunction::Sha2_256 {
                return Err(Error::InvalidConfig(
                    "CIDv0 only supports sha2-256".to_string(),
                ));
            }
            if self.leaves != LeafPolicy::Framed {
                return Err(Error::InvalidConfig(
                    "raw leaves require CIDv1".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn prefix(&self) -> Prefix {
        Prefix {
            version: self.cid_version,
            hash_function: self.hash_function,
        }
    }

    pub fn raw_leaves(&self) -> bool {
        self.leaves != LeafPolicy::Framed
    }

    /// Validates the parameters, and sets up a helper pulling chunks from
    /// `chunks` and storing nodes in `block_service`.
    pub fn new_helper<'a, BS, S>(
        &self,
        block_service: BS,
        chunks: S,
    ) -> Result<DagBuilderHelper<'a, BS>, Error>
    where
        BS: BlockService,
        S: Stream<Item = io::Result<Bytes>> + Send + 'a,
    {
        self.validate()?;
        Ok(DagBuilderHelper::new(
            block_service,
            self.clone(),
            chunks.boxed(),
        ))
    }
}
