use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;

use crate::Error;

mod from_addr;
mod memory;
mod simplefs;

#[cfg(test)]
mod tests;

pub use self::from_addr::from_addr;
pub use self::memory::MemoryBlockService;
pub use self::simplefs::SimpleFilesystemBlockService;

/// A content-addressed block: a payload together with the CID naming it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    pub fn new(cid: Cid, data: Bytes) -> Self {
        Self { cid, data }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Checks the payload hashes to the digest in the CID.
    pub fn verify(&self) -> Result<(), Error> {
        crate::digests::verify(&self.cid, &self.data)
    }
}

/// The base trait all BlockService services need to implement.
/// It stores and retrieves immutable blocks by their CID.
#[async_trait]
pub trait BlockService: Send + Sync {
    /// Check if the service has the block.
    async fn has(&self, cid: &Cid) -> Result<bool, Error>;

    /// Retrieve a block by its CID. Returns `Ok(None)` if it doesn't exist.
    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error>;

    /// Insert a block. Implementations must reject blocks whose payload does
    /// not match their CID. Inserting an existing block is a no-op.
    async fn put(&self, block: Block) -> Result<Cid, Error>;
}

#[async_trait]
impl<A> BlockService for A
where
    A: AsRef<dyn BlockService> + Send + Sync,
{
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        self.as_ref().has(cid).await
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        self.as_ref().get(cid).await
    }

    async fn put(&self, block: Block) -> Result<Cid, Error> {
        self.as_ref().put(block).await
    }
}
