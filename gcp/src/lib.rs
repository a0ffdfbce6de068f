//! Remote single-file copy tools - `gcp` (client) and `gcpd` (server)
//!
//! # Tools
//!
//! ## gcpd - Copy Server
//!
//! `gcpd` listens on a TCP port and serves two calls: CopyTo (the client pushes a
//! file to the server) and CopyFrom (the client pulls a file from the server).
//!
//! ```bash
//! gcpd --port 10001 -v
//! ```
//!
//! ## gcp - Copy Client
//!
//! Exactly one of the two arguments names a server using `host:/path` syntax
//! (similar to `scp`); the direction follows from which one it is:
//!
//! ```bash
//! # push a local file to the server
//! gcp /var/tmp/x.iso dhcp-101:/var/opt/x.iso
//!
//! # pull a file from the server
//! gcp dhcp-101:/var/opt/y.iso /var/tmp/y.iso --summary
//! ```
//!
//! # Wire format
//!
//! A file travels as a stream of chunks. A push starts with a path chunk naming
//! the destination on the server, followed by data chunks of at most
//! [`remote::protocol::BLOCK_SIZE`] bytes. A pull carries data chunks only.
//! Chunks are applied strictly in order; the file content is the concatenation
//! of the data chunks.
//!
//! The server opens the destination of a push on the first data chunk. A push
//! of an empty file is therefore acknowledged without creating anything.
//!
//! # Module Structure
//!
//! - [`path`] - `host:path` argument parsing
//! - [`client`] - push / pull orchestration on top of [`remote::rpc::Channel`]
//! - [`server`] - the `gcpd` service

pub mod client;
pub mod path;
pub mod server;
