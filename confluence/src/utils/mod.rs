//! Internal data structures.
//!
//! This module provides low-level utilities used by the reactor.
//! In particular, it exposes a [`Slab`] used for index-stable storage of
//! watch, timer and hook slots with reuse of freed indices.

mod slab;

pub(crate) use slab::Slab;
