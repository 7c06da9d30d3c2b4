use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tar::{Builder, EntryType, Header};

use super::ArchiveSink;
use crate::Error;

const DIRECTORY_MODE: u32 = 0o777;
const FILE_MODE: u32 = 0o644;
const SYMLINK_MODE: u32 = 0o777;

/// Headers carry no timestamps, so archives of the same DAG are identical.
fn header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header
}

#[async_trait]
impl<W> ArchiveSink for Builder<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn directory(&mut self, path: &str) -> Result<(), Error> {
        let mut header = header(EntryType::Directory, DIRECTORY_MODE, 0);
        self.append_data(&mut header, path, tokio::io::empty())
            .await?;
        Ok(())
    }

    async fn regular_file(
        &mut self,
        path: &str,
        size: u64,
        contents: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), Error> {
        let mut header = header(EntryType::Regular, FILE_MODE, size);
        self.append_data(&mut header, path, contents).await?;
        Ok(())
    }

    async fn symlink(&mut self, path: &str, target: &str) -> Result<(), Error> {
        let mut header = header(EntryType::Symlink, SYMLINK_MODE, 0);
        header.set_link_name(target)?;
        self.append_data(&mut header, path, tokio::io::empty())
            .await?;
        Ok(())
    }
}
