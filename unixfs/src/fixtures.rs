use bytes::Bytes;
use cid::Cid;
use lazy_static::lazy_static;

use crate::blockservice::Block;
use crate::digests::{CidVersion, HashFunction, Prefix, DAG_PB, RAW};
use crate::node::FileNode;
use crate::proto::DataType;

pub const HELLOWORLD_BLOB_CONTENTS: &[u8] = b"Hello World!";

pub const V1_PREFIX: Prefix = Prefix {
    version: CidVersion::V1,
    hash_function: HashFunction::Sha2_256,
};

/// Returns `len` deterministic, incompressible bytes derived from `seed`.
pub fn pseudo_random_bytes(seed: u64, len: usize) -> Bytes {
    let mut buf = vec![0; len];
    blake3::Hasher::new()
        .update(&seed.to_le_bytes())
        .finalize_xof()
        .fill(&mut buf);
    buf.into()
}

lazy_static! {
    pub static ref DUMMY_CID: Cid = Prefix::default().sum(DAG_PB, b"dummy").unwrap();

    /// "Hello World!" as a raw block.
    pub static ref HELLOWORLD_BLOCK: Block = {
        let data = Bytes::from_static(HELLOWORLD_BLOB_CONTENTS);
        Block::new(V1_PREFIX.sum(RAW, &data).unwrap(), data)
    };

    /// An empty dag-pb file node.
    pub static ref RAW_BLOCK_A: Block = {
        let data = FileNode::new(DataType::File).encode();
        Block::new(Prefix::default().sum(DAG_PB, &data).unwrap(), data)
    };

    // 1MiB + 1
    pub static ref BLOB_B: Bytes = pseudo_random_bytes(1, 1024 * 1024 + 1);
}
