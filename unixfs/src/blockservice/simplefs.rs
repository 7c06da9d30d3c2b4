use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cid::Cid;
use data_encoding::HEXLOWER;
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

use super::{Block, BlockService};
use crate::Error;

/// Stores blocks on an existing path backed by a POSIX-compliant filesystem.
///
/// It creates a `tmp` directory and a `blocks` directory inside of it. All
/// blocks received are staged in `tmp`, then moved **atomically** into
/// `blocks/DIGEST[:1]/CID`, sharded by the first byte of the multihash digest.
#[derive(Clone)]
pub struct SimpleFilesystemBlockService {
    path: PathBuf,
}

impl SimpleFilesystemBlockService {
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        tokio::fs::create_dir_all(path.join("tmp")).await?;
        tokio::fs::create_dir_all(path.join("blocks")).await?;

        Ok(Self { path })
    }
}

fn derive_path(root: &Path, cid: &Cid) -> PathBuf {
    let digest = cid.hash().digest();
    let prefix = HEXLOWER.encode(&digest[..digest.len().min(1)]);

    root.join("blocks").join(prefix).join(cid.to_string())
}

fn map_tempfile_err(e: async_tempfile::Error) -> Error {
    match e {
        async_tempfile::Error::Io(io_error) => Error::Io(io_error),
        e => Error::StorageError(format!("unable to create temporary file: {e:?}")),
    }
}

#[async_trait]
impl BlockService for SimpleFilesystemBlockService {
    #[instrument(skip_all, ret, err, fields(block.cid = %cid))]
    async fn has(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(tokio::fs::try_exists(derive_path(&self.path, cid)).await?)
    }

    #[instrument(skip_all, err, fields(block.cid = %cid))]
    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        match tokio::fs::read(derive_path(&self.path, cid)).await {
            Ok(data) => Ok(Some(Block::new(*cid, data.into()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all, err, fields(block.cid = %block.cid()))]
    async fn put(&self, block: Block) -> Result<Cid, Error> {
        if let Err(e) = block.verify() {
            warn!(err = %e, "refusing to store invalid block");
            return Err(Error::InvalidRequest(e.to_string()));
        }

        let dst_path = derive_path(&self.path, block.cid());
        if tokio::fs::try_exists(&dst_path).await? {
            return Ok(*block.cid());
        }

        let mut file = async_tempfile::TempFile::new_in(self.path.join("tmp"))
            .await
            .map_err(map_tempfile_err)?;
        file.write_all(block.data()).await?;
        file.flush().await?;
        file.sync_all().await?;

        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(file.file_path(), &dst_path).await?;

        Ok(*block.cid())
    }
}
