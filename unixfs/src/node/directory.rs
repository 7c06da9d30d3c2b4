use bytes::Bytes;
use cid::Cid;

use super::{encode_pb, Link};
use crate::proto::{Data, DataType};
use crate::Error;

/// Checks a directory entry name can be used as a single path component.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(format!("invalid entry name {name:?}"));
    }
    Ok(())
}

/// A flat directory. Entries are kept sorted by name, which is also the order
/// they are serialized in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    links: Vec<Link>,
}

impl DirectoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn decode(cid: &Cid, links: Vec<Link>) -> Result<Self, Error> {
        for link in &links {
            match &link.name {
                Some(name) => validate_name(name).map_err(|e| Error::corrupt(cid, e))?,
                None => return Err(Error::corrupt(cid, "directory entry without a name")),
            }
        }

        Ok(Self { links })
    }

    pub fn add_entry(&mut self, name: impl Into<String>, cid: Cid, size: u64) -> Result<(), Error> {
        let name = name.into();
        validate_name(&name).map_err(Error::InvalidRequest)?;

        let pos = match self
            .links
            .binary_search_by(|l| l.name.as_deref().unwrap_or_default().cmp(name.as_str()))
        {
            Ok(_) => {
                return Err(Error::InvalidRequest(format!(
                    "duplicate directory entry {name:?}"
                )))
            }
            Err(pos) => pos,
        };

        self.links.insert(pos, Link::new(Some(name), cid, size));
        Ok(())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Sum of the cumulative sizes of all entries.
    pub fn children_size(&self) -> u64 {
        self.links.iter().map(|l| l.size).sum()
    }

    pub fn encode(&self) -> Bytes {
        encode_pb(&self.links, Data::new(DataType::Directory))
    }
}

/// One level of a hash array mapped trie directory.
///
/// Link names start with the upper-case hex encoded bucket index, padded to
/// the width needed for `fanout - 1`. Links whose name is only the index
/// point to a sub-shard, all others are entries, the entry name following
/// the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HamtShard {
    fanout: u64,
    links: Vec<Link>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardEntry<'a> {
    Shard(&'a Link),
    Entry(&'a str, &'a Link),
}

impl HamtShard {
    pub fn new(fanout: u64, links: Vec<Link>) -> Result<Self, Error> {
        if fanout < 2 || !fanout.is_power_of_two() {
            return Err(Error::InvalidRequest(format!("invalid fanout {fanout}")));
        }
        Ok(Self { fanout, links })
    }

    pub(crate) fn decode(cid: &Cid, fsdata: Data, links: Vec<Link>) -> Result<Self, Error> {
        let fanout = fsdata
            .fanout
            .ok_or_else(|| Error::corrupt(cid, "sharded directory without fanout"))?;

        Self::new(fanout, links).map_err(|e| Error::corrupt(cid, e.to_string()))
    }

    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    fn padding(&self) -> usize {
        format!("{:X}", self.fanout - 1).len()
    }

    /// Classifies each link into sub-shards and entries, in link order.
    pub fn entries(&self, cid: &Cid) -> Result<Vec<ShardEntry<'_>>, Error> {
        let padding = self.padding();

        self.links
            .iter()
            .map(|link| {
                let name = link
                    .name
                    .as_deref()
                    .ok_or_else(|| Error::corrupt(cid, "shard link without a name"))?;

                if name.len() < padding || !name.is_char_boundary(padding) {
                    return Err(Error::corrupt(cid, format!("invalid shard link {name:?}")));
                }

                if name.len() == padding {
                    Ok(ShardEntry::Shard(link))
                } else {
                    let entry = &name[padding..];
                    validate_name(entry).map_err(|e| Error::corrupt(cid, e))?;
                    Ok(ShardEntry::Entry(entry, link))
                }
            })
            .collect()
    }

    pub fn encode(&self) -> Bytes {
        encode_pb(
            &self.links,
            Data {
                fanout: Some(self.fanout),
                // murmur3-x64-64
                hash_type: Some(0x22),
                ..Data::new(DataType::HamtShard)
            },
        )
    }
}

pub fn encode_symlink(target: &str) -> Bytes {
    encode_pb(
        &[],
        Data {
            data: Some(Bytes::copy_from_slice(target.as_bytes())),
            ..Data::new(DataType::Symlink)
        },
    )
}
