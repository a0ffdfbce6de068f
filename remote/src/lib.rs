//! Chunked file transfer protocol for `gcp` and `gcpd`.
//!
//! - [`protocol`]: message shapes exchanged on the wire
//! - [`streams`]: length-delimited bincode framing over any async byte stream
//! - [`transfer`]: transport-agnostic Stream Writer / Stream Reader
//! - [`rpc`]: the CopyTo / CopyFrom calls over TCP

pub mod protocol;
pub mod rpc;
pub mod streams;
pub mod transfer;
