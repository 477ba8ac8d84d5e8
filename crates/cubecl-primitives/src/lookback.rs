use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::instructions::ScanInstruction;
use crate::temp::ScratchView;

/// Status tags of a look-back cell. A cell starts EMPTY, its owning cube
/// publishes PARTIAL exactly once, and INCLUSIVE is terminal. Only the
/// owning cube ever writes a cell.
pub(crate) const STATUS_EMPTY: u32 = 0;
pub(crate) const STATUS_PARTIAL: u32 = 1;
pub(crate) const STATUS_INCLUSIVE: u32 = 2;

/// A cell packs `(status << 32) | bits(payload)` into a single atomic word.
/// Publication of tag and payload is therefore indivisible, which is the
/// only ordering guarantee available without a device memory fence; this is
/// why the single-pass engines are limited to 32-bit payloads.
#[cube]
fn pack<N: Numeric>(status: u32, value: N) -> u64 {
    (u64::cast_from(status) << 32) | u64::cast_from(u32::reinterpret(value))
}

#[cube]
fn status_of(word: u64) -> u32 {
    u32::cast_from(word >> 32)
}

#[cube]
fn value_of<N: Numeric>(word: u64) -> N {
    N::reinterpret(u32::cast_from(word & 0xFFFF_FFFF))
}

/// Publish this cube's tile aggregate. Must be called by the owning cube
/// before it starts walking its predecessors.
#[cube]
pub(crate) fn set_partial<N: Numeric>(state: &mut Tensor<Atomic<u64>>, cube_index: u32, value: N) {
    Atomic::store(&state[cube_index], pack::<N>(STATUS_PARTIAL, value));
}

/// Publish this cube's inclusive prefix. Terminal; later readers observe
/// INCLUSIVE and stop their walk here.
#[cube]
pub(crate) fn set_complete<N: Numeric>(
    state: &mut Tensor<Atomic<u64>>,
    cube_index: u32,
    prefix: N,
) {
    Atomic::store(&state[cube_index], pack::<N>(STATUS_INCLUSIVE, prefix));
}

/// Resolve the exclusive prefix of `cube_index` by walking predecessors in
/// strictly decreasing index order: PARTIAL aggregates accumulate on the
/// left of the running suffix, an INCLUSIVE prefix terminates the walk.
/// Spins while a predecessor is still EMPTY; a predecessor with a lower
/// ticket is already executing, so the wait is bounded.
///
/// Must not be called for cube 0, and a cube never reads its own cell.
#[cube]
pub(crate) fn wait_prefix<N: Numeric, I: ScanInstruction>(
    state: &Tensor<Atomic<u64>>,
    cube_index: u32,
) -> N {
    let mut running = I::null_value::<N>();
    let mut prefix = I::null_value::<N>();
    let mut predecessor = cube_index;
    let mut done = false;

    while !done {
        predecessor -= 1;
        let mut word = Atomic::load(&state[predecessor]);
        while status_of(word) == STATUS_EMPTY {
            word = Atomic::load(&state[predecessor]);
        }
        let value = value_of::<N>(word);
        if status_of(word) == STATUS_INCLUSIVE {
            prefix = I::combine::<N>(value, running);
            done = true;
        } else {
            running = I::combine::<N>(value, running);
        }
    }
    prefix
}

/// Zero a `u32` view of device memory.
#[cube(launch_unchecked)]
pub(crate) fn clear_scratch_kernel(buffer: &mut Tensor<u32>, #[comptime] items_per_unit: u32) {
    let mut index = CUBE_POS * CUBE_DIM * items_per_unit + UNIT_POS;
    for _ in 0..items_per_unit {
        if index < buffer.len() {
            buffer[index] = 0u32;
        }
        index += CUBE_DIM;
    }
}

/// Reset every look-back cell to EMPTY and the ticket dispenser to zero.
/// The state array is cleared through a `u32` view of the same bytes.
#[cube(launch_unchecked)]
pub(crate) fn init_lookback_kernel(
    state: &mut Tensor<u32>,
    ticket: &mut Tensor<u32>,
    #[comptime] items_per_unit: u32,
) {
    let mut index = CUBE_POS * CUBE_DIM * items_per_unit + UNIT_POS;
    for _ in 0..items_per_unit {
        if index < state.len() {
            state[index] = 0u32;
        }
        index += CUBE_DIM;
    }
    if ABSOLUTE_POS == 0 {
        ticket[0] = 0u32;
    }
}

/// Enqueue the state/ticket reset ahead of a look-back kernel on the same
/// queue.
pub(crate) fn init_state<R: Runtime>(
    client: &ComputeClient<R::Server, R::Channel>,
    state_words: &ScratchView,
    ticket: &ScratchView,
) {
    let items_per_unit = 4u32;
    let cube_dim = CubeDim::new_1d(256);
    let cubes = state_words
        .len()
        .div_ceil((cube_dim.num_elems() * items_per_unit) as usize)
        .max(1) as u32;
    unsafe {
        init_lookback_kernel::launch_unchecked::<R>(
            client,
            CubeCount::new_1d(cubes),
            cube_dim,
            state_words.as_ref::<R>().as_tensor_arg(1),
            ticket.as_ref::<R>().as_tensor_arg(1),
            items_per_unit,
        );
    }
}

/// Zero a small `u32` output tensor, used for the `size == 0` edge case of
/// operations that must still report a count of zero.
pub(crate) fn clear_counts<R: Runtime>(
    client: &ComputeClient<R::Server, R::Channel>,
    output: &TensorHandleRef<R>,
) {
    unsafe {
        clear_scratch_kernel::launch_unchecked::<R>(
            client,
            CubeCount::new_1d(1),
            CubeDim::new_1d(32),
            output.as_tensor_arg(1),
            1u32,
        );
    }
}
