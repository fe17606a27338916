//! # rad
//!
//! Read-only, thread-safe random access to bytes from heterogeneous sources.
//!
//! Every source is wrapped into a [`RandomAccessData`], a bounded window that
//! supports positional reads, async reads, transfers and sub-windows. Windows
//! created with [`RandomAccessData::subsection`] share the underlying source
//! without copying and are closed independently; the source is released once
//! the last window over it is closed.
//!
//! ## Backends
//!
//! - In-memory arrays ([`from_bytes`])
//! - Cursor-based buffers and memory maps ([`from_buffer`], [`from_mmap`])
//! - Files with positional reads ([`open_file`])
//! - Single-cursor `Read + Seek` sources ([`open_seekable`])
//! - Files read asynchronously on tokio's blocking pool ([`open_async_file`])
//! - Sequential-only streams, pooled to emulate random access ([`from_stream_factory`])
//!
//! Custom backends implement [`ReadAt`] and are wrapped with
//! [`RandomAccessData::new`].
//!
//! ## Example
//!
//! ```no_run
//! use rad::open_file;
//!
//! fn main() -> rad::Result<()> {
//!     let data = open_file("archive.bin", 0, None)?;
//!     let header = data.read_from(0, 16)?;
//!
//!     // A window over the payload, sharing the same file handle
//!     let payload = data.subsection_from(header.len() as u64)?;
//!     let bytes = payload.read_all_bytes()?;
//!     println!("{} header bytes, {} payload bytes", header.len(), bytes.len());
//!
//!     payload.close()?;
//!     data.close()
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod reader;
pub mod shared;
pub mod window;

pub use cli::Cli;
pub use error::{Bounds, RadError, Result};
pub use io::{
    BufferReclaimer, DEFAULT_MAX_POOL_SIZE, PooledStream, ReadAt, from_async_file, from_buffer,
    from_bytes, from_file, from_mmap, from_pooled_stream_factory, from_seekable,
    from_seekable_stream_factory, from_stream_factory, open_async_file, open_file, open_seekable,
    open_stream_factory,
};
pub use reader::RadReader;
pub use shared::{CloseListener, Release, SharedResource};
pub use window::{MIN_TRANSFER_BUFFER_SIZE, RandomAccessData};
