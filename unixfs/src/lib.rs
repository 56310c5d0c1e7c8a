mod digests;
mod errors;

pub mod blockservice;
pub mod chunker;
pub mod export;
pub mod fixtures;
pub mod hamt;
pub mod import;
pub mod nodes;
pub mod proto;
pub mod utils;

pub use digests::{B3Digest, B3_LEN};
pub use errors::Error;

#[cfg(test)]
mod tests;

#[cfg(test)]
use rstest_reuse;
