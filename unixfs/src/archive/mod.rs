//! Serializing UnixFS DAGs into archives.
//!
//! [ArchiveWriter] walks a DAG and hands one entry per node to an
//! [ArchiveSink], parents before their children, siblings in link order.
use async_trait::async_trait;
use cid::Cid;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::blockservice::BlockService;
use crate::node::{validate_name, Link, Node, ShardEntry};
use crate::reader::DagReader;
use crate::utils::cancellable;
use crate::Error;

mod tar;

/// Receives archive entries, in order. Paths are relative, their components
/// joined with `/`.
///
/// Each entry must be completely written before the call returns.
#[async_trait]
pub trait ArchiveSink: Send {
    async fn directory(&mut self, path: &str) -> Result<(), Error>;

    /// `contents` yields exactly `size` bytes, unless reading the DAG fails.
    async fn regular_file(
        &mut self,
        path: &str,
        size: u64,
        contents: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), Error>;

    async fn symlink(&mut self, path: &str, target: &str) -> Result<(), Error>;
}

enum Work {
    /// A node that gets its own entry.
    Entry { path: String, cid: Cid },
    /// A sub-shard of a sharded directory, its entries belong to `path`.
    Shard { path: String, cid: Cid },
}

/// Writes DAGs from a [BlockService] into an [ArchiveSink].
pub struct ArchiveWriter<BS> {
    block_service: BS,
    cancel: CancellationToken,
}

impl<BS> ArchiveWriter<BS>
where
    BS: BlockService + Clone + 'static,
{
    pub fn new(block_service: BS) -> Self {
        Self {
            block_service,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Writes the DAG rooted at `root` to `sink`, naming the root `name`.
    ///
    /// If `name` is empty, the root (which must be a directory then) gets no
    /// entry, and its children are placed at the top level.
    #[instrument(skip(self, sink), err)]
    pub async fn write<S>(&self, sink: &mut S, root: &Cid, name: &str) -> Result<(), Error>
    where
        S: ArchiveSink + ?Sized,
    {
        if !name.is_empty() {
            validate_name(name).map_err(Error::InvalidRequest)?;
        }

        let mut stack = vec![Work::Entry {
            path: name.to_string(),
            cid: *root,
        }];

        while let Some(work) = stack.pop() {
            match work {
                Work::Entry { path, cid } => {
                    let node = self.fetch(&cid).await?;
                    self.write_entry(sink, &mut stack, path, cid, node).await?;
                }
                Work::Shard { path, cid } => match self.fetch(&cid).await? {
                    Node::HamtShard(shard) => {
                        push_shard_entries(&mut stack, &path, &cid, shard.entries(&cid)?)
                    }
                    other => {
                        return Err(Error::corrupt(
                            &cid,
                            format!("expected a sub-shard, found {}", other.kind()),
                        ))
                    }
                },
            }
        }

        Ok(())
    }

    async fn fetch(&self, cid: &Cid) -> Result<Node, Error> {
        cancellable(&self.cancel, Node::fetch(&self.block_service, cid)).await
    }

    async fn write_entry<S>(
        &self,
        sink: &mut S,
        stack: &mut Vec<Work>,
        path: String,
        cid: Cid,
        node: Node,
    ) -> Result<(), Error>
    where
        S: ArchiveSink + ?Sized,
    {
        match node {
            Node::Directory(dir) => {
                self.directory(sink, &path).await?;
                push_links(stack, &path, &cid, dir.links())?;
            }
            // deprecated, but its links are named like a directory's.
            Node::Metadata(links) => {
                self.directory(sink, &path).await?;
                push_links(stack, &path, &cid, &links)?;
            }
            Node::HamtShard(shard) => {
                self.directory(sink, &path).await?;
                push_shard_entries(stack, &path, &cid, shard.entries(&cid)?);
            }
            Node::Symlink(target) => {
                check_named(&path, &cid)?;
                let target = std::str::from_utf8(&target)
                    .map_err(|_| Error::corrupt(&cid, "symlink target is not valid UTF-8"))?;

                cancellable(&self.cancel, sink.symlink(&path, target)).await?;
                debug!(%path, target, "wrote symlink");
            }
            node @ (Node::Raw(_) | Node::File(_)) => {
                check_named(&path, &cid)?;
                let mut reader = DagReader::from_node(self.block_service.clone(), &cid, node)?
                    .with_cancellation(self.cancel.clone());
                let size = reader.size();

                cancellable(&self.cancel, sink.regular_file(&path, size, &mut reader)).await?;
                debug!(%path, size, "wrote file");
            }
        }
        Ok(())
    }

    async fn directory<S>(&self, sink: &mut S, path: &str) -> Result<(), Error>
    where
        S: ArchiveSink + ?Sized,
    {
        if path.is_empty() {
            return Ok(());
        }
        cancellable(&self.cancel, sink.directory(path)).await?;
        debug!(%path, "wrote directory");
        Ok(())
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}/{name}")
    }
}

fn check_named(path: &str, cid: &Cid) -> Result<(), Error> {
    if path.is_empty() {
        return Err(Error::InvalidRequest(format!(
            "{cid} is not a directory, it needs a name"
        )));
    }
    Ok(())
}

/// Schedules the links of a directory, so they are popped in link order.
fn push_links(stack: &mut Vec<Work>, path: &str, cid: &Cid, links: &[Link]) -> Result<(), Error> {
    for link in links.iter().rev() {
        let name = link
            .name
            .as_deref()
            .ok_or_else(|| Error::corrupt(cid, "directory entry without a name"))?;
        validate_name(name).map_err(|e| Error::corrupt(cid, e))?;

        stack.push(Work::Entry {
            path: join(path, name),
            cid: link.cid,
        });
    }
    Ok(())
}

/// Schedules the entries of a shard. Sub-shards are expanded in place.
fn push_shard_entries(stack: &mut Vec<Work>, path: &str, cid: &Cid, entries: Vec<ShardEntry<'_>>) {
    for entry in entries.into_iter().rev() {
        stack.push(match entry {
            ShardEntry::Shard(link) => Work::Shard {
                path: path.to_string(),
                cid: link.cid,
            },
            ShardEntry::Entry(name, link) => Work::Entry {
                path: join(path, name),
                cid: link.cid,
            },
        });
    }
    debug!(%cid, %path, "expanded shard");
}
