//! Device-wide data-parallel primitives for CubeCL.
//!
//! This crate provides the building blocks applications use to process large
//! one-dimensional device tensors: prefix scans, stable partition/select,
//! reduce-by-key and stable radix sorts (whole-array and segmented).
//!
//! Every operation is a stateless asynchronous enqueue on a [`ComputeClient`]
//! and follows a two-call protocol for caller-owned scratch memory, see
//! [`TempStorage`]. The scan and partition engines share a single-pass
//! decoupled look-back coordination scheme; reduce-by-key runs batched
//! kernels with a carry-out fix-up; the radix engines ping-pong between two
//! buffers and report where the sorted result landed.
//!
//! [`ComputeClient`]: cubecl_core::prelude::ComputeClient

mod config;
mod error;
mod lookback;
mod ordered;
mod primitives;
mod temp;

pub mod instructions;
pub mod partition;
pub mod radix;
pub mod reduce_by_key;
pub mod scan;

#[cfg(any(test, feature = "export_tests"))]
pub(crate) mod reference;

#[cfg(feature = "export_tests")]
pub mod tests;

pub use config::*;
pub use error::*;
pub use partition::{partition_flagged, select_flagged};
pub use radix::{
    segmented_sort_keys, segmented_sort_keys_descending, segmented_sort_pairs,
    segmented_sort_pairs_descending, sort_keys, sort_keys_descending, sort_keys_double_buffer,
    sort_keys_double_buffer_descending, sort_pairs, sort_pairs_descending,
    sort_pairs_double_buffer, sort_pairs_double_buffer_descending, DoubleBuffer, RadixBits,
    RadixKey,
};
pub use reduce_by_key::reduce_by_key;
pub use scan::{exclusive_scan, inclusive_scan};
pub use temp::TempStorage;
