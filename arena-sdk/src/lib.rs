//! Wire contract shared by every producer and consumer of arena events.
//!
//! Everything in this crate is a plain serde DTO. Database representations
//! live in `arena-core::entities` and convert from/into these types.

pub mod objects;
