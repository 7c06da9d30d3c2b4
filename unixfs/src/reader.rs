//! Reading file DAGs back as byte streams.
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use cid::Cid;
use futures::stream::{self, BoxStream};
use futures::{ready, StreamExt, TryStreamExt};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::blockservice::BlockService;
use crate::node::Node;
use crate::utils::cancellable;
use crate::Error;

/// Number of sibling children fetched ahead of the one being read.
const PREFETCH: usize = 8;

pin_project! {
    /// Provides [AsyncRead] and [AsyncSeek] over the contents of a file DAG.
    ///
    /// Blocks are only fetched while reading. Seeking uses the blocksizes
    /// recorded in file nodes to skip over children without fetching them.
    /// Every fetched block is verified, children whose size does not match
    /// what their parent declares fail the read with corrupt data.
    pub struct DagReader<BS> {
        block_service: BS,
        root: Node,
        size: u64,
        cancel: CancellationToken,

        #[pin]
        r: Box<dyn AsyncRead + Unpin + Send>,

        pos: u64,
    }
}

impl<BS> DagReader<BS>
where
    BS: BlockService + Clone + 'static,
{
    /// Fetches the root and sets up a reader from its start.
    ///
    /// Metadata nodes are followed to the node they describe. Anything that
    /// does not carry file contents is refused.
    #[instrument(skip(block_service), err)]
    pub async fn new(block_service: BS, cid: &Cid) -> Result<Self, Error> {
        let mut cid = *cid;
        let mut node = Node::fetch(&block_service, &cid).await?;

        while let Node::Metadata(links) = &node {
            let first = links
                .first()
                .ok_or_else(|| Error::corrupt(&cid, "metadata node without content"))?;
            cid = first.cid;
            node = Node::fetch(&block_service, &cid).await?;
        }

        Self::from_node(block_service, &cid, node)
    }

    /// Sets up a reader over an already decoded node.
    pub fn from_node(block_service: BS, cid: &Cid, node: Node) -> Result<Self, Error> {
        let size = match &node {
            Node::Raw(data) => data.len() as u64,
            Node::File(file) => file.file_size(),
            other => {
                return Err(Error::NotAFile {
                    cid: *cid,
                    kind: other.kind(),
                })
            }
        };

        let cancel = CancellationToken::new();
        let r = reader_skipped_offset(block_service.clone(), cancel.clone(), node.clone(), 0);

        Ok(Self {
            block_service,
            root: node,
            size,
            cancel,
            r,
            pos: 0,
        })
    }

    /// Fails pending and future reads with [Error::Cancelled] once `token`
    /// is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self.r = reader_skipped_offset(
            self.block_service.clone(),
            self.cancel.clone(),
            self.root.clone(),
            self.pos,
        );
        self
    }

    /// Size of the file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<BS> AsyncRead for DagReader<BS>
where
    BS: BlockService + Clone + 'static,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let filled_before = buf.filled().len();

        let this = self.project();

        ready!(this.r.poll_read(cx, buf))?;
        let bytes_read = buf.filled().len() - filled_before;
        *this.pos += bytes_read as u64;

        Ok(()).into()
    }
}

impl<BS> AsyncSeek for DagReader<BS>
where
    BS: BlockService + Clone + 'static,
{
    #[instrument(skip(self), err(Debug))]
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let total_len = self.size;
        let mut this = self.project();

        let absolute_offset: u64 = match position {
            io::SeekFrom::Start(from_start) => from_start,
            io::SeekFrom::End(from_end) => total_len.checked_add_signed(from_end).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "over/underflow while seeking")
            })?,
            io::SeekFrom::Current(from_current) => {
                this.pos.checked_add_signed(from_current).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "over/underflow while seeking")
                })?
            }
        };

        if absolute_offset != *this.pos {
            if absolute_offset > total_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seeked beyond EOF",
                ));
            }

            *this.pos = absolute_offset;
            *this.r = reader_skipped_offset(
                this.block_service.clone(),
                this.cancel.clone(),
                this.root.clone(),
                absolute_offset,
            );
        }

        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

fn reader_skipped_offset<BS>(
    block_service: BS,
    cancel: CancellationToken,
    root: Node,
    offset: u64,
) -> Box<dyn AsyncRead + Unpin + Send>
where
    BS: BlockService + Clone + 'static,
{
    let bytes_stream = file_stream(block_service, cancel, root, offset).map_err(io::Error::from);
    Box::new(StreamReader::new(bytes_stream))
}

/// Returns the contents of `node`, starting at `offset`.
///
/// Children are visited in link order, those ending before `offset` are not
/// fetched at all.
fn file_stream<BS>(
    block_service: BS,
    cancel: CancellationToken,
    node: Node,
    offset: u64,
) -> BoxStream<'static, Result<Bytes, Error>>
where
    BS: BlockService + Clone + 'static,
{
    let file = match node {
        Node::Raw(data) => return stream::iter(skip_bytes(&data, offset).map(Ok)).boxed(),
        Node::File(file) => file,
        // only reachable for the root, the kind is checked before.
        other => {
            return stream::once(async move {
                Err(Error::InvalidRequest(format!(
                    "{} has no file contents",
                    other.kind()
                )))
            })
            .boxed()
        }
    };

    let mut offset = offset;
    let inline = file.data().and_then(|data| {
        let skipped = skip_bytes(data, offset);
        offset = offset.saturating_sub(data.len() as u64);
        skipped
    });

    // (cid, size, offset inside the child)
    let mut children = Vec::new();
    for (link, size) in file.children() {
        if offset >= size {
            offset -= size;
            continue;
        }
        children.push((link.cid, size, offset));
        offset = 0;
    }

    let children = stream::iter(children)
        .map(move |(cid, size, offset)| {
            let block_service = block_service.clone();
            let cancel = cancel.clone();
            async move {
                let node = cancellable(&cancel, Node::fetch(&block_service, &cid)).await?;
                check_size(&cid, &node, size)?;
                Ok::<_, Error>(file_stream(block_service, cancel, node, offset))
            }
        })
        .buffered(PREFETCH)
        .try_flatten();

    stream::iter(inline.map(Ok)).chain(children).boxed()
}

fn skip_bytes(data: &Bytes, offset: u64) -> Option<Bytes> {
    let offset = usize::try_from(offset).ok()?;
    (offset < data.len()).then(|| data.slice(offset..))
}

/// Checks a child carries exactly as many bytes as its parent declares.
fn check_size(cid: &Cid, node: &Node, expected: u64) -> Result<(), Error> {
    let actual = match node {
        Node::Raw(data) => data.len() as u64,
        Node::File(file) => file.file_size(),
        other => {
            warn!(%cid, kind = %other.kind(), "unexpected node in file dag");
            return Err(Error::corrupt(
                cid,
                format!("unexpected {} in file dag", other.kind()),
            ));
        }
    };

    if actual != expected {
        warn!(%cid, actual, expected, "child size mismatch");
        return Err(Error::corrupt(
            cid,
            format!("expected {expected} bytes, got {actual}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, SeekFrom};

    use bytes::Bytes;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};
    use tokio_util::sync::CancellationToken;

    use super::DagReader;
    use crate::blockservice::{Block, BlockService};
    use crate::chunker::size_splitter;
    use crate::digests::{Prefix, DAG_PB};
    use crate::fixtures::{pseudo_random_bytes, DUMMY_CID, HELLOWORLD_BLOB_CONTENTS, HELLOWORLD_BLOCK};
    use crate::importer::{DagBuilderParams, Layout};
    use crate::node::{encode_pb, DirectoryNode, FileNode, Link};
    use crate::proto::{Data, DataType};
    use crate::utils::gen_block_service;
    use crate::Error;

    const DATA_LEN: usize = 300;

    async fn put(block_service: &std::sync::Arc<dyn BlockService>, data: Bytes) -> cid::Cid {
        let cid = Prefix::default().sum(DAG_PB, &data).unwrap();
        block_service.put(Block::new(cid, data)).await.unwrap()
    }

    async fn build(
        block_service: &std::sync::Arc<dyn BlockService>,
        layout: Layout,
        data: Bytes,
    ) -> cid::Cid {
        let params = DagBuilderParams {
            max_links: 4,
            depth_repeat: 2,
            ..Default::default()
        };
        let db = params
            .new_helper(block_service.clone(), size_splitter(Cursor::new(data), 8))
            .unwrap();
        layout.build(db).await.expect("must build").cid
    }

    /// Reading from an offset gives the same bytes as reading from the start
    /// and discarding up to that offset.
    #[rstest]
    #[case::balanced(Layout::Balanced)]
    #[case::trickle(Layout::Trickle)]
    #[tokio::test]
    async fn seek_start(#[case] layout: Layout) {
        let block_service = gen_block_service();
        let data = pseudo_random_bytes(3, DATA_LEN);
        let cid = build(&block_service, layout, data.clone()).await;

        for offset in [0, 1, 7, 8, 9, 31, 32, 33, 100, 255, 299, 300] {
            let mut r = DagReader::new(block_service.clone(), &cid).await.unwrap();
            assert_eq!(DATA_LEN as u64, r.size());

            r.seek(SeekFrom::Start(offset)).await.unwrap();
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).await.unwrap();

            assert_eq!(&data[offset as usize..], &buf[..], "offset {offset}");
        }
    }

    #[tokio::test]
    async fn seek_relative() {
        let block_service = gen_block_service();
        let data = pseudo_random_bytes(4, DATA_LEN);
        let cid = build(&block_service, Layout::Balanced, data.clone()).await;

        let mut r = DagReader::new(block_service.clone(), &cid).await.unwrap();
        let mut buf = [0; 10];

        assert_eq!(290, r.seek(SeekFrom::End(-10)).await.unwrap());
        r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&data[290..], &buf[..]);

        assert_eq!(100, r.seek(SeekFrom::Current(-200)).await.unwrap());
        r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&data[100..110], &buf[..]);

        let err = r.seek(SeekFrom::Start(301)).await.expect_err("must fail");
        assert_eq!(std::io::ErrorKind::InvalidInput, err.kind());
    }

    #[tokio::test]
    async fn read_directory_fails() {
        let block_service = gen_block_service();
        let cid = put(&block_service, DirectoryNode::new().encode()).await;

        let err = DagReader::new(block_service, &cid)
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, Error::NotAFile { .. }));
    }

    #[tokio::test]
    async fn read_metadata() {
        let block_service = gen_block_service();
        block_service.put(HELLOWORLD_BLOCK.clone()).await.unwrap();
        let cid = put(
            &block_service,
            encode_pb(
                &[Link::new(None, *HELLOWORLD_BLOCK.cid(), 12)],
                Data::new(DataType::Metadata),
            ),
        )
        .await;

        let mut r = DagReader::new(block_service, &cid).await.unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(HELLOWORLD_BLOB_CONTENTS, buf);
    }

    #[tokio::test]
    async fn read_empty() {
        let block_service = gen_block_service();
        let cid = put(&block_service, FileNode::new(DataType::File).encode()).await;

        let mut r = DagReader::new(block_service, &cid).await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(0, r.read_to_end(&mut buf).await.unwrap());
    }

    #[tokio::test]
    async fn missing_child() {
        let block_service = gen_block_service();
        let mut root = FileNode::with_data(DataType::File, Bytes::from_static(b"abc"));
        root.add_child(Link::new(None, *DUMMY_CID, 10), 5);
        let cid = put(&block_service, root.encode()).await;

        let mut r = DagReader::new(block_service, &cid).await.unwrap();
        let mut buf = Vec::new();
        let err = r.read_to_end(&mut buf).await.expect_err("must fail");

        assert!(matches!(Error::from(err), Error::BlockNotFound(cid) if cid == *DUMMY_CID));
        // not transactional, the inline data was already produced.
        assert_eq!(b"abc".to_vec(), buf);
    }

    #[tokio::test]
    async fn child_size_mismatch() {
        let block_service = gen_block_service();
        block_service.put(HELLOWORLD_BLOCK.clone()).await.unwrap();

        let mut root = FileNode::new(DataType::File);
        root.add_child(Link::new(None, *HELLOWORLD_BLOCK.cid(), 12), 5);
        let cid = put(&block_service, root.encode()).await;

        let mut r = DagReader::new(block_service, &cid).await.unwrap();
        let err = r.read_to_end(&mut Vec::new()).await.expect_err("must fail");

        assert_eq!(std::io::ErrorKind::InvalidData, err.kind());
        assert!(Error::from(err).is_corrupt_data());
    }

    #[tokio::test]
    async fn cancelled() {
        let block_service = gen_block_service();
        let cid = build(&block_service, Layout::Balanced, pseudo_random_bytes(5, 64)).await;

        let token = CancellationToken::new();
        token.cancel();

        let mut r = DagReader::new(block_service, &cid)
            .await
            .unwrap()
            .with_cancellation(token);
        let err = r.read_to_end(&mut Vec::new()).await.expect_err("must fail");

        assert!(matches!(Error::from(err), Error::Cancelled));
    }
}
