//! The UnixFS `Data` protobuf message, carried in the `Data` field of
//! dag-pb nodes.
//!
//! ```protobuf
//! syntax = "proto2";
//!
//! message Data {
//!   enum DataType {
//!     Raw = 0;
//!     Directory = 1;
//!     File = 2;
//!     Metadata = 3;
//!     Symlink = 4;
//!     HAMTShard = 5;
//!   }
//!
//!   required DataType Type = 1;
//!   optional bytes Data = 2;
//!   optional uint64 filesize = 3;
//!   repeated uint64 blocksizes = 4;
//!   optional uint64 hashType = 5;
//!   optional uint64 fanout = 6;
//! }
//! ```
use bytes::Bytes;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(enumeration = "DataType", required, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "bytes", optional, tag = "2")]
    pub data: Option<Bytes>,
    #[prost(uint64, optional, tag = "3")]
    pub filesize: Option<u64>,
    #[prost(uint64, repeated, packed = "false", tag = "4")]
    pub blocksizes: Vec<u64>,
    #[prost(uint64, optional, tag = "5")]
    pub hash_type: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    pub fanout: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HamtShard = 5,
}

impl Data {
    pub fn new(data_type: DataType) -> Self {
        Self {
            r#type: data_type as i32,
            ..Default::default()
        }
    }
}
