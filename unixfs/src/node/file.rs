use bytes::Bytes;
use cid::Cid;

use super::{encode_pb, Link};
use crate::proto::{Data, DataType};
use crate::Error;

/// A dag-pb file node. It holds optional inline data, followed by the
/// contents of its children, in link order. `blocksizes` holds the number of
/// file bytes below each child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNode {
    data_type: DataType,
    data: Option<Bytes>,
    links: Vec<Link>,
    blocksizes: Vec<u64>,
}

impl FileNode {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            data: None,
            links: Vec::new(),
            blocksizes: Vec::new(),
        }
    }

    pub fn with_data(data_type: DataType, data: Bytes) -> Self {
        Self {
            data: Some(data),
            ..Self::new(data_type)
        }
    }

    pub(crate) fn decode(
        cid: &Cid,
        data_type: DataType,
        fsdata: Data,
        links: Vec<Link>,
    ) -> Result<Self, Error> {
        if links.len() != fsdata.blocksizes.len() {
            return Err(Error::corrupt(
                cid,
                format!(
                    "{} links but {} blocksizes",
                    links.len(),
                    fsdata.blocksizes.len()
                ),
            ));
        }

        let node = Self {
            data_type,
            data: fsdata.data,
            links,
            blocksizes: fsdata.blocksizes,
        };

        if let Some(declared) = fsdata.filesize {
            if declared != node.file_size() {
                return Err(Error::corrupt(
                    cid,
                    format!(
                        "declared file size {declared} does not match contents ({})",
                        node.file_size()
                    ),
                ));
            }
        }

        Ok(node)
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Inline data, preceding the contents of the children.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn file_size(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.len() as u64) + self.blocksizes.iter().sum::<u64>()
    }

    pub fn num_children(&self) -> usize {
        self.links.len()
    }

    /// Iterates over the children, along with the number of file bytes
    /// each of them contributes.
    pub fn children(&self) -> impl Iterator<Item = (&Link, u64)> {
        self.links.iter().zip(self.blocksizes.iter().copied())
    }

    pub fn add_child(&mut self, link: Link, blocksize: u64) {
        self.links.push(link);
        self.blocksizes.push(blocksize);
    }

    pub fn pop_child(&mut self) -> Option<(Link, u64)> {
        let link = self.links.pop()?;
        let blocksize = self.blocksizes.pop()?;
        Some((link, blocksize))
    }

    /// Sum of the cumulative sizes of all children.
    pub fn children_size(&self) -> u64 {
        self.links.iter().map(|l| l.size).sum()
    }

    pub fn encode(&self) -> Bytes {
        encode_pb(
            &self.links,
            Data {
                data: self.data.clone(),
                filesize: Some(self.file_size()),
                blocksizes: self.blocksizes.clone(),
                ..Data::new(self.data_type)
            },
        )
    }
}
