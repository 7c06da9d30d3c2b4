//! Turns byte streams into UnixFS DAGs.
//!
//! A [DagBuilderHelper] pulls chunks from a splitter and stores leaves and
//! finalized nodes in a [BlockService]. How the nodes are arranged is up to
//! the layout, see [balanced] and [trickle].
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::instrument;

use crate::blockservice::BlockService;
use crate::chunker::SplitterConfig;
use crate::Error;

pub mod balanced;
pub mod fs;
mod helpers;
mod params;
pub mod trickle;

pub use helpers::{leaf_block, BuiltNode, DagBuilderHelper};
pub use params::{DagBuilderParams, LeafPolicy, DEFAULT_DEPTH_REPEAT, DEFAULT_LINKS_PER_BLOCK};

/// Leaves larger than this are refused.
pub const BLOCK_SIZE_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Balanced,
    Trickle,
}

impl Layout {
    /// Consumes all chunks of `db`, arranged in this layout.
    pub async fn build<BS: BlockService>(
        &self,
        db: DagBuilderHelper<'_, BS>,
    ) -> Result<BuiltNode, Error> {
        match self {
            Layout::Balanced => balanced::layout(db).await,
            Layout::Trickle => trickle::layout(db).await,
        }
    }
}

/// Splits the contents of `r` and imports them as a single file.
#[instrument(skip(block_service, r), err)]
pub async fn import_reader<BS, R>(
    block_service: BS,
    params: &DagBuilderParams,
    layout: Layout,
    splitter: &SplitterConfig,
    r: R,
) -> Result<BuiltNode, Error>
where
    BS: BlockService,
    R: AsyncRead + Send + Unpin,
{
    let db = params.new_helper(block_service, splitter.split(r))?;
    layout.build(db).await
}
