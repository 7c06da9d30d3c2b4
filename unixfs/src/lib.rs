mod errors;

#[cfg(test)]
use rstest_reuse;

pub mod archive;
pub mod blockservice;
pub mod chunker;
pub mod digests;
#[cfg(test)]
pub mod fixtures;
pub mod importer;
pub mod node;
pub mod proto;
pub mod reader;
pub mod utils;

pub use errors::Error;

#[cfg(test)]
mod tests;

