//! Background Tasks Module
//!
//! - Expiry sweep: purges expired records from the in-process memory backend.
//!   Redis and Memcached expire records themselves.

mod cleanup;

pub use cleanup::spawn_cleanup_task;
