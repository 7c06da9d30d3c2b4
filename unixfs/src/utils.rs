use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::blockservice::{BlockService, MemoryBlockService};
use crate::Error;

pub fn gen_block_service() -> Arc<dyn BlockService> {
    Arc::new(MemoryBlockService::default())
}

/// Drives `fut` to completion, unless `token` gets cancelled first.
pub(crate) async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}
