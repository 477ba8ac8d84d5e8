use cubecl_core as cubecl;
use cubecl_core::prelude::*;

/// An associative binary operator family used by the scan, partition and
/// reduce-by-key engines.
///
/// `combine` may be non-commutative: the engines compose operands strictly
/// in source order. `null_value` must be a two-sided identity of `combine`
/// so that partial tiles can be padded and look-back accumulators seeded
/// without disturbing the result.
#[cube]
pub trait ScanInstruction: Send + Sync + 'static + core::fmt::Debug {
    fn combine<N: Numeric>(lhs: N, rhs: N) -> N;

    fn null_value<N: Numeric>() -> N;
}
