use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use parking_lot::RwLock;
use tracing::{instrument, warn};

use super::{Block, BlockService};
use crate::Error;

#[derive(Clone, Default)]
pub struct MemoryBlockService {
    db: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

#[async_trait]
impl BlockService for MemoryBlockService {
    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(self.db.read().contains_key(cid))
    }

    #[instrument(skip(self, cid), fields(block.cid = %cid))]
    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        Ok(self
            .db
            .read()
            .get(cid)
            .map(|data| Block::new(*cid, data.clone())))
    }

    #[instrument(skip_all, fields(block.cid = %block.cid()), err)]
    async fn put(&self, block: Block) -> Result<Cid, Error> {
        if let Err(e) = block.verify() {
            warn!(err = %e, "refusing to store invalid block");
            return Err(Error::InvalidRequest(e.to_string()));
        }

        let cid = *block.cid();
        self.db.write().entry(cid).or_insert(block.into_data());

        Ok(cid)
    }
}
