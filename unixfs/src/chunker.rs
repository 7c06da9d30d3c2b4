//! Splitters turning a byte stream into a stream of chunks.
use std::fmt;
use std::io;
use std::str::FromStr;

use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use fastcdc::v2020::AsyncStreamCDC;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::importer::BLOCK_SIZE_LIMIT;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Selects a splitter, and its parameters.
///
/// The string representation is `size-<size>` for fixed-size chunks and
/// `fastcdc-<min>-<avg>-<max>` for content-defined chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum SplitterConfig {
    Size(usize),
    FastCdc { min: u32, avg: u32, max: u32 },
}

impl Default for SplitterConfig {
    fn default() -> Self {
        SplitterConfig::Size(DEFAULT_CHUNK_SIZE)
    }
}

impl SplitterConfig {
    /// Splits the contents of `r` according to this config.
    pub fn split<'a, R>(&self, r: R) -> BoxStream<'a, io::Result<Bytes>>
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        match *self {
            SplitterConfig::Size(size) => size_splitter(r, size).boxed(),
            SplitterConfig::FastCdc { min, avg, max } => {
                fastcdc_splitter(r, min, avg, max).boxed()
            }
        }
    }
}

fn parse_num<T: FromStr>(s: &str) -> Result<T, String> {
    s.parse()
        .map_err(|_| format!("invalid splitter parameter {s:?}"))
}

impl FromStr for SplitterConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let config = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("" | "default"), None, None, None) => SplitterConfig::default(),
            (Some("size"), None, None, None) => SplitterConfig::default(),
            (Some("size"), Some(size), None, None) => SplitterConfig::Size(parse_num(size)?),
            (Some("fastcdc"), None, None, None) => SplitterConfig::FastCdc {
                min: 64 * 1024,
                avg: 256 * 1024,
                max: 1024 * 1024,
            },
            (Some("fastcdc"), Some(min), Some(avg), Some(max)) => SplitterConfig::FastCdc {
                min: parse_num(min)?,
                avg: parse_num(avg)?,
                max: parse_num(max)?,
            },
            _ => return Err(format!("unrecognized splitter {s:?}")),
        };

        if parts.next().is_some() {
            return Err(format!("unrecognized splitter {s:?}"));
        }

        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<String> for SplitterConfig {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SplitterConfig> for String {
    fn from(value: SplitterConfig) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SplitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitterConfig::Size(size) => write!(f, "size-{size}"),
            SplitterConfig::FastCdc { min, avg, max } => write!(f, "fastcdc-{min}-{avg}-{max}"),
        }
    }
}

impl SplitterConfig {
    fn validate(&self) -> Result<(), String> {
        match *self {
            SplitterConfig::Size(size) => {
                if size == 0 {
                    return Err("chunk size must be positive".to_string());
                }
                if size > BLOCK_SIZE_LIMIT {
                    return Err(format!(
                        "chunk size {size} exceeds the block size limit of {BLOCK_SIZE_LIMIT}"
                    ));
                }
            }
            SplitterConfig::FastCdc { min, avg, max } => {
                use fastcdc::v2020::{
                    AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN,
                };

                if !(MINIMUM_MIN..=MINIMUM_MAX).contains(&min)
                    || !(AVERAGE_MIN..=AVERAGE_MAX).contains(&avg)
                    || !(MAXIMUM_MIN..=MAXIMUM_MAX).contains(&max)
                    || !(min <= avg && avg <= max)
                {
                    return Err(format!("invalid fastcdc parameters {min}-{avg}-{max}"));
                }
                if max as usize > BLOCK_SIZE_LIMIT {
                    return Err(format!(
                        "maximum chunk size {max} exceeds the block size limit of {BLOCK_SIZE_LIMIT}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Produces chunks of exactly `size` bytes, except for the last one, which
/// may be shorter. Empty input produces no chunks.
pub fn size_splitter<R>(mut r: R, size: usize) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(size);
            while buf.len() < size {
                let remaining = (size - buf.len()) as u64;
                if (&mut r).take(remaining).read_buf(&mut buf).await? == 0 {
                    break;
                }
            }

            if buf.is_empty() {
                break;
            }

            let full = buf.len() == size;
            yield buf.freeze();

            if !full {
                break;
            }
        }
    }
}

/// Produces content-defined chunks using FastCDC.
pub fn fastcdc_splitter<R>(r: R, min: u32, avg: u32, max: u32) -> impl Stream<Item = io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    try_stream! {
        let mut chunker = AsyncStreamCDC::new(r, min, avg, max);
        let chunks = chunker.as_stream();
        tokio::pin!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(io::Error::from)?;
            yield Bytes::from(chunk.data);
        }
    }
}
