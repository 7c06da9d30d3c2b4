use std::path::PathBuf;

use url::Url;

use super::{BlockService, MemoryBlockService, SimpleFilesystemBlockService};
use crate::Error;

/// Constructs a new instance of a [BlockService] from an URI.
///
/// The following schemes are supported by the following services:
/// - `memory://` ([MemoryBlockService])
/// - `simplefs:///absolute/path` ([SimpleFilesystemBlockService])
pub async fn from_addr(uri: &str) -> Result<Box<dyn BlockService>, Error> {
    let url =
        Url::parse(uri).map_err(|e| Error::InvalidConfig(format!("unable to parse url: {}", e)))?;

    let block_service: Box<dyn BlockService> = match url.scheme() {
        "memory" => {
            // memory doesn't support host or path in the URL.
            if url.has_host() || !url.path().is_empty() {
                return Err(Error::InvalidConfig("invalid url".to_string()));
            }
            Box::<MemoryBlockService>::default()
        }
        "simplefs" => {
            // simplefs requires an absolute path, and no host.
            if url.has_host() {
                return Err(Error::InvalidConfig("no host allowed".to_string()));
            }
            if url.path().is_empty() || url.path() == "/" {
                return Err(Error::InvalidConfig(
                    "cowardly refusing to use / as block store".to_string(),
                ));
            }

            Box::new(SimpleFilesystemBlockService::new(PathBuf::from(url.path())).await?)
        }
        scheme => {
            return Err(Error::InvalidConfig(format!(
                "unknown scheme: {}",
                scheme
            )))
        }
    };

    Ok(block_service)
}
