//! Imports that deal with a real filesystem.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use super::{import_reader, BuiltNode, DagBuilderParams, Layout};
use crate::blockservice::{Block, BlockService};
use crate::chunker::SplitterConfig;
use crate::digests::DAG_PB;
use crate::node::{encode_symlink, DirectoryNode};
use crate::Error;

/// Number of files imported concurrently.
const CONCURRENT_FILES: usize = 8;

enum IngestionEntry {
    Dir,
    /// A file or symlink, already stored.
    Stored(BuiltNode),
}

/// Ingests the contents at a given path, and returns the root.
///
/// Files are split with `splitter` and arranged in `layout`. Symlinks are not
/// followed, not even at the root. Directory entries are sorted by name, so
/// the result only depends on the contents of the tree.
///
/// `file_size` of the returned node is zero if the root is a directory or a
/// symlink.
#[instrument(skip_all, fields(path = ?path.as_ref(), ?layout), err)]
pub async fn ingest_path<BS, P>(
    block_service: BS,
    params: &DagBuilderParams,
    layout: Layout,
    splitter: &SplitterConfig,
    path: P,
) -> Result<BuiltNode, Error>
where
    BS: BlockService + Clone,
    P: AsRef<Path>,
{
    params.validate()?;
    let root = path.as_ref();

    let iter = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(false)
        .contents_first(true)
        .sort_by_file_name()
        .into_iter();

    let mut entries = futures::stream::iter(iter)
        .map(|entry| {
            let block_service = block_service.clone();
            async move {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                let path = entry
                    .path()
                    .strip_prefix(root)
                    .map_err(|_| {
                        Error::InvalidRequest(format!("{:?} is outside of the root", entry.path()))
                    })?
                    .to_path_buf();

                let ingestion_entry =
                    ingest_entry(block_service, params, layout, splitter, &entry).await?;
                Ok::<_, Error>((path, ingestion_entry))
            }
        })
        .buffered(CONCURRENT_FILES);

    // For a given path, this holds the directories as they are populated.
    let mut directories: HashMap<PathBuf, DirectoryNode> = HashMap::new();

    while let Some((path, entry)) = entries.try_next().await? {
        let node = match entry {
            IngestionEntry::Dir => {
                // not in there if it has no children.
                let directory = directories.remove(&path).unwrap_or_default();
                store_directory(&block_service, params, &directory).await?
            }
            IngestionEntry::Stored(node) => node,
        };

        // contents come first, the root is the last entry.
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            debug!(cid = %node.cid, "ingested path");
            return Ok(node);
        };

        let name = name
            .to_str()
            .ok_or_else(|| Error::InvalidRequest(format!("{path:?} is not valid UTF-8")))?;

        directories
            .entry(parent.to_path_buf())
            .or_default()
            .add_entry(name, node.cid, node.tsize)?;
    }

    Err(Error::InvalidRequest(format!("{root:?} produced no entries")))
}

async fn ingest_entry<BS>(
    block_service: BS,
    params: &DagBuilderParams,
    layout: Layout,
    splitter: &SplitterConfig,
    entry: &DirEntry,
) -> Result<IngestionEntry, Error>
where
    BS: BlockService,
{
    let file_type = entry.file_type();

    if file_type.is_dir() {
        Ok(IngestionEntry::Dir)
    } else if file_type.is_symlink() {
        let target = tokio::fs::read_link(entry.path()).await?;
        let target = target.to_str().ok_or_else(|| {
            Error::InvalidRequest(format!(
                "symlink target of {:?} is not valid UTF-8",
                entry.path()
            ))
        })?;

        let encoded = encode_symlink(target);
        let tsize = encoded.len() as u64;
        let cid = params.prefix().sum(DAG_PB, &encoded)?;
        block_service.put(Block::new(cid, encoded)).await?;

        Ok(IngestionEntry::Stored(BuiltNode {
            cid,
            file_size: 0,
            tsize,
        }))
    } else if file_type.is_file() {
        let file = tokio::fs::File::open(entry.path()).await?;
        let node = import_reader(block_service, params, layout, splitter, file).await?;
        Ok(IngestionEntry::Stored(node))
    } else {
        Err(Error::InvalidRequest(format!(
            "unsupported file type at {:?}",
            entry.path()
        )))
    }
}

async fn store_directory<BS: BlockService>(
    block_service: &BS,
    params: &DagBuilderParams,
    directory: &DirectoryNode,
) -> Result<BuiltNode, Error> {
    let encoded = directory.encode();
    let tsize = encoded.len() as u64 + directory.children_size();
    let cid = params.prefix().sum(DAG_PB, &encoded)?;
    block_service.put(Block::new(cid, encoded)).await?;

    Ok(BuiltNode {
        cid,
        file_size: 0,
        tsize,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::ingest_path;
    use crate::chunker::SplitterConfig;
    use crate::fixtures::HELLOWORLD_BLOB_CONTENTS;
    use crate::importer::{DagBuilderParams, Layout};
    use crate::node::Node;
    use crate::tests::utils::read_all;
    use crate::utils::gen_block_service;
    use crate::Error;

    fn populate() -> TempDir {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path();

        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::File::create(root.join("a/b/f.txt"))
            .unwrap()
            .write_all(HELLOWORLD_BLOB_CONTENTS)
            .unwrap();
        std::fs::File::create(root.join("a/empty")).unwrap();
        std::os::unix::fs::symlink("target", root.join("a/link")).unwrap();

        tmpdir
    }

    #[tokio::test]
    async fn ingest_tree() {
        let tmpdir = populate();
        let block_service = gen_block_service();

        let root = ingest_path(
            block_service.clone(),
            &DagBuilderParams::v1(),
            Layout::Balanced,
            &SplitterConfig::default(),
            tmpdir.path().join("a"),
        )
        .await
        .expect("must ingest");

        let Node::Directory(dir) = Node::fetch(&block_service, &root.cid).await.unwrap() else {
            panic!("root must be a directory");
        };
        let names: Vec<_> = dir
            .links()
            .iter()
            .map(|l| l.name.clone().unwrap())
            .collect();
        assert_eq!(vec!["b", "empty", "link"], names);

        let Node::Symlink(target) = Node::fetch(&block_service, &dir.links()[2].cid)
            .await
            .unwrap()
        else {
            panic!("link must be a symlink");
        };
        assert_eq!(&b"target"[..], &target[..]);

        let Node::Directory(b) = Node::fetch(&block_service, &dir.links()[0].cid)
            .await
            .unwrap()
        else {
            panic!("b must be a directory");
        };
        assert_eq!(
            HELLOWORLD_BLOB_CONTENTS,
            read_all(&block_service, &b.links()[0].cid).await
        );
        assert!(read_all(&block_service, &dir.links()[1].cid).await.is_empty());
    }

    #[tokio::test]
    async fn ingest_deterministic() {
        let tmpdir = populate();
        let mut roots = vec![];

        for _ in 0..2 {
            let root = ingest_path(
                gen_block_service(),
                &DagBuilderParams::default(),
                Layout::Trickle,
                &SplitterConfig::Size(4),
                tmpdir.path(),
            )
            .await
            .expect("must ingest");
            roots.push(root);
        }

        assert_eq!(roots[0], roots[1]);
    }

    #[tokio::test]
    async fn ingest_single_file() {
        let tmpdir = populate();
        let block_service = gen_block_service();

        let root = ingest_path(
            block_service.clone(),
            &DagBuilderParams::default(),
            Layout::Balanced,
            &SplitterConfig::Size(4),
            tmpdir.path().join("a/b/f.txt"),
        )
        .await
        .expect("must ingest");

        assert_eq!(HELLOWORLD_BLOB_CONTENTS.len() as u64, root.file_size);
        assert_eq!(
            HELLOWORLD_BLOB_CONTENTS,
            read_all(&block_service, &root.cid).await
        );
    }

    #[tokio::test]
    async fn ingest_missing() {
        let tmpdir = TempDir::new().unwrap();

        let err = ingest_path(
            gen_block_service(),
            &DagBuilderParams::default(),
            Layout::Balanced,
            &SplitterConfig::default(),
            tmpdir.path().join("nope"),
        )
        .await
        .expect_err("must fail");

        assert!(matches!(err, Error::Io(_)));
    }
}
