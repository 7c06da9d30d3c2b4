use cid::multihash::Multihash;
use cid::Cid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Multicodec of protobuf-framed DAG nodes.
pub const DAG_PB: u64 = 0x70;
/// Multicodec of raw leaf blocks.
pub const RAW: u64 = 0x55;

const SHA2_256: u64 = 0x12;
const BLAKE3: u64 = 0x1e;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CidVersion {
    #[default]
    V0,
    V1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum HashFunction {
    #[default]
    #[serde(rename = "sha2-256")]
    Sha2_256,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashFunction {
    /// The multihash code of this hash function.
    pub fn code(&self) -> u64 {
        match self {
            HashFunction::Sha2_256 => SHA2_256,
            HashFunction::Blake3 => BLAKE3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            SHA2_256 => Some(HashFunction::Sha2_256),
            BLAKE3 => Some(HashFunction::Blake3),
            _ => None,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Result<Multihash<64>, Error> {
        let res = match self {
            HashFunction::Sha2_256 => Multihash::wrap(SHA2_256, Sha256::digest(data).as_slice()),
            HashFunction::Blake3 => Multihash::wrap(BLAKE3, blake3::hash(data).as_bytes()),
        };

        res.map_err(|e| Error::InvalidConfig(format!("unable to wrap digest: {e}")))
    }
}

/// The identifier format used for newly created blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Prefix {
    pub version: CidVersion,
    pub hash_function: HashFunction,
}

impl Prefix {
    /// Hashes `data` and returns its CID for the given codec.
    /// Raw blocks always get a CIDv1, as CIDv0 can only express dag-pb.
    pub fn sum(&self, codec: u64, data: &[u8]) -> Result<Cid, Error> {
        let mh = self.hash_function.digest(data)?;

        match (self.version, codec) {
            (CidVersion::V0, DAG_PB) => Cid::new_v0(mh)
                .map_err(|e| Error::InvalidConfig(format!("unable to construct CIDv0: {e}"))),
            _ => Ok(Cid::new_v1(codec, mh)),
        }
    }
}

/// Checks that `data` hashes to the digest contained in `cid`.
pub fn verify(cid: &Cid, data: &[u8]) -> Result<(), Error> {
    let hash_function = HashFunction::from_code(cid.hash().code()).ok_or_else(|| {
        Error::corrupt(
            cid,
            format!("unsupported multihash code {:#x}", cid.hash().code()),
        )
    })?;

    if hash_function.digest(data)? != *cid.hash() {
        return Err(Error::corrupt(cid, "digest mismatch"));
    }

    Ok(())
}
