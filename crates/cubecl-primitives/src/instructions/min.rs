use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use super::ScanInstruction;

#[derive(Debug, Clone, Copy)]
pub struct Min;

#[cube]
impl ScanInstruction for Min {
    fn combine<N: Numeric>(lhs: N, rhs: N) -> N {
        select(rhs < lhs, rhs, lhs)
    }

    fn null_value<N: Numeric>() -> N {
        N::max_value()
    }
}
