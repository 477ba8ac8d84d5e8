#![allow(missing_docs)]

pub mod radix;
pub mod reduce_by_key;
pub mod scan;

/// Generate the full device test suite for a `TestRuntime`.
#[macro_export]
macro_rules! testgen_primitives {
    () => {
        mod test_primitives {
            use super::*;

            cubecl_primitives::testgen_primitives_scan!();
            cubecl_primitives::testgen_primitives_partition!();
            cubecl_primitives::testgen_primitives_reduce_by_key!();
            cubecl_primitives::testgen_primitives_radix_sort!();
        }
    };
}
