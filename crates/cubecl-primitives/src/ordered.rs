use cubecl_core as cubecl;
use cubecl_core::prelude::*;

/// Claim this cube's logical index from the shared ticket dispenser.
///
/// The hardware cube index cannot be used for look-back: a cube must only
/// ever wait on cubes that started before it, and the scheduler does not
/// dispatch in index order. One atomic increment per cube, cached in shared
/// memory, decouples coordination order from scheduling order.
#[cube]
pub(crate) fn ordered_cube_id(counter: &mut Tensor<Atomic<u32>>) -> u32 {
    let mut cache = SharedMemory::<u32>::new(1);
    if UNIT_POS == 0 {
        cache[0] = Atomic::add(&counter[0], 1u32);
    }
    sync_cube();
    cache[0]
}
