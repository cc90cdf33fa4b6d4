//! An in-memory key/value store with a length-prefixed binary protocol,
//! a non-blocking readiness-driven event loop, and a chained hash table with
//! progressive (incremental) rehashing.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod codec;
pub mod conn;
pub mod error;
pub mod handlers;
pub mod map;
pub mod server;
pub mod transport;
pub mod wire;

pub use error::KvError;
pub use server::Server;
