use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use super::ScanInstruction;

#[derive(Debug, Clone, Copy)]
pub struct Sum;

#[cube]
impl ScanInstruction for Sum {
    fn combine<N: Numeric>(lhs: N, rhs: N) -> N {
        lhs + rhs
    }

    fn null_value<N: Numeric>() -> N {
        N::from_int(0)
    }
}
