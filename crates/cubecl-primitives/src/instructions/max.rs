use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use super::ScanInstruction;

#[derive(Debug, Clone, Copy)]
pub struct Max;

#[cube]
impl ScanInstruction for Max {
    fn combine<N: Numeric>(lhs: N, rhs: N) -> N {
        select(lhs < rhs, rhs, lhs)
    }

    fn null_value<N: Numeric>() -> N {
        N::min_value()
    }
}
