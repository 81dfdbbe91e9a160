//! Reference-counted packet buffers built on a [netcore_pool::Pool].
//!
//! A packet is a [Chain]: a singly linked list of [Segment]s, each a view (offset and
//! length) into a data segment. Data segments live in pool blocks and are shared through a
//! reference count, so slicing a packet ([Chain::copy]) never copies payload bytes. A data
//! segment returns to the pool exactly when the last segment viewing it is freed.
//!
//! Every allocating operation takes an explicit [Context] naming the pool to draw from and,
//! optionally, a drain hook that is given one chance to reclaim memory before a failed
//! allocation is retried.
//!
//! # Example
//!
//! ```rust
//! use netcore_buffer::{Chain, Context};
//! use netcore_pool::{Alignment, Pool};
//!
//! let pool = Pool::init(vec![0u8; 4096], Alignment::Unit16).unwrap();
//! let ctx = Context::new(pool.clone());
//!
//! let mut packet = Chain::from_slice(&ctx, b"header|payload", false).unwrap();
//! let payload = packet.copy(&ctx, 7, None, false).unwrap();
//! packet.trim(-7).unwrap();
//!
//! assert_eq!(packet.to_vec().unwrap(), b"header|");
//! assert_eq!(payload.to_vec().unwrap(), b"payload");
//!
//! drop((packet, payload));
//! assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
//! ```

use thiserror::Error;

mod chain;
pub use chain::{concat, Chain, Segments};
mod context;
pub use context::{Context, Drain};
mod queue;
pub use queue::Queue;
mod segment;
pub use segment::Segment;

/// Bytes reserved in the pool for every segment node.
///
/// Data segments reserve only their payload: the count of segments viewing a data segment
/// is kept by an [std::sync::Arc] on the heap rather than in the pool block.
pub const NODE_SIZE: usize = 24;

/// Errors that can occur when interacting with a [Chain] or [Queue].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("pool error: {0}")]
    Pool(#[from] netcore_pool::Error),
    #[error("out of range: offset={offset} len={len} total={total}")]
    OutOfRange {
        offset: usize,
        len: usize,
        total: usize,
    },
    #[error("destination too small: need {needed} bytes, have {remaining}")]
    DestinationTooSmall { needed: usize, remaining: usize },
    #[error("chain not queued: {0}")]
    NotQueued(usize),
}
