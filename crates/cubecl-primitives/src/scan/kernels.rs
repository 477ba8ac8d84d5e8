use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::instructions::ScanInstruction;
use crate::lookback::{set_complete, set_partial, wait_prefix};
use crate::ordered::ordered_cube_id;
use crate::primitives::cube_inclusive_scan;

/// Load this unit's blocked items (padded with the identity past `size`),
/// scan them serially, then scan the unit aggregates cube-wide. Returns the
/// exclusive prefix of this unit within the tile and the tile aggregate.
/// `items` ends up holding the unit-local inclusive results.
#[cube]
fn scan_tile<N: Numeric, I: ScanInstruction>(
    input: &Tensor<N>,
    items: &mut Array<N>,
    ladder: &mut SharedMemory<N>,
    unit_base: u32,
    size: u32,
    #[comptime] items_per_unit: u32,
) -> (N, N) {
    #[unroll]
    for i in 0..items_per_unit {
        let index = unit_base + i;
        items[i] = if index < size {
            input[index]
        } else {
            I::null_value::<N>()
        };
    }

    let mut running = items[0];
    #[unroll]
    for i in 1..items_per_unit {
        running = I::combine::<N>(running, items[i]);
        items[i] = running;
    }

    let _ = cube_inclusive_scan::<N, I>(running, ladder);
    let unit_exclusive = if UNIT_POS > 0 {
        ladder[UNIT_POS - 1]
    } else {
        I::null_value::<N>()
    };
    (unit_exclusive, ladder[CUBE_DIM - 1])
}

/// Apply the unit's prefix and write this unit's results. In exclusive mode
/// every output is shifted one to the right and composed with the caller's
/// initial value on the left.
#[cube]
fn store_tile<N: Numeric, I: ScanInstruction>(
    output: &mut Tensor<N>,
    items: &Array<N>,
    unit_prefix: N,
    initial_value: N,
    unit_base: u32,
    size: u32,
    #[comptime] exclusive: bool,
    #[comptime] items_per_unit: u32,
) {
    let mut previous = unit_prefix;
    #[unroll]
    for i in 0..items_per_unit {
        let index = unit_base + i;
        let inclusive = I::combine::<N>(unit_prefix, items[i]);
        if index < size {
            if comptime![exclusive] {
                output[index] = I::combine::<N>(initial_value, previous);
            } else {
                output[index] = inclusive;
            }
        }
        previous = inclusive;
    }
}

/// Whole-input scan by a single cube; used when one tile covers the input
/// and for the top of the tile-prefix recursion.
#[cube(launch_unchecked)]
pub fn scan_single_kernel<N: Numeric, I: ScanInstruction>(
    input: &Tensor<N>,
    output: &mut Tensor<N>,
    initial_value: N,
    size: u32,
    #[comptime] exclusive: bool,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut ladder = SharedMemory::<N>::new(cube_size);
    let mut items = Array::<N>::new(items_per_unit);

    let unit_base = UNIT_POS * items_per_unit;
    let (unit_exclusive, _) =
        scan_tile::<N, I>(input, &mut items, &mut ladder, unit_base, size, items_per_unit);
    store_tile::<N, I>(
        output,
        &items,
        unit_exclusive,
        initial_value,
        unit_base,
        size,
        exclusive,
        items_per_unit,
    );
}

/// Single-pass scan: every cube claims an ordered ticket, publishes its tile
/// aggregate, resolves its exclusive prefix through the decoupled look-back
/// walk and stores in the same launch. Cube 0 publishes INCLUSIVE directly
/// and skips the walk.
#[cube(launch_unchecked)]
pub fn scan_lookback_kernel<N: Numeric, I: ScanInstruction>(
    input: &Tensor<N>,
    output: &mut Tensor<N>,
    state: &mut Tensor<Atomic<u64>>,
    ticket: &mut Tensor<Atomic<u32>>,
    initial_value: N,
    size: u32,
    #[comptime] exclusive: bool,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut ladder = SharedMemory::<N>::new(cube_size);
    let mut tile_prefix = SharedMemory::<N>::new(1);
    let mut items = Array::<N>::new(items_per_unit);

    let cube_id = ordered_cube_id(ticket);
    let unit_base = cube_id * CUBE_DIM * items_per_unit + UNIT_POS * items_per_unit;

    let (unit_exclusive, tile_aggregate) =
        scan_tile::<N, I>(input, &mut items, &mut ladder, unit_base, size, items_per_unit);

    if UNIT_POS == 0 {
        if cube_id == 0 {
            set_complete::<N>(state, 0u32, tile_aggregate);
            tile_prefix[0] = I::null_value::<N>();
        } else {
            set_partial::<N>(state, cube_id, tile_aggregate);
            let prefix = wait_prefix::<N, I>(state, cube_id);
            set_complete::<N>(state, cube_id, I::combine::<N>(prefix, tile_aggregate));
            tile_prefix[0] = prefix;
        }
    }
    sync_cube();

    let unit_prefix = I::combine::<N>(tile_prefix[0], unit_exclusive);
    store_tile::<N, I>(
        output,
        &items,
        unit_prefix,
        initial_value,
        unit_base,
        size,
        exclusive,
        items_per_unit,
    );
}

/// Reduce every tile to its aggregate; first kernel of the iterative
/// reduce-then-scan pipeline.
#[cube(launch_unchecked)]
pub fn tile_reduce_kernel<N: Numeric, I: ScanInstruction>(
    input: &Tensor<N>,
    tile_aggregates: &mut Tensor<N>,
    size: u32,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut ladder = SharedMemory::<N>::new(cube_size);

    let unit_base = CUBE_POS * CUBE_DIM * items_per_unit + UNIT_POS * items_per_unit;
    let mut acc = I::null_value::<N>();
    #[unroll]
    for i in 0..items_per_unit {
        let index = unit_base + i;
        let value = if index < size {
            input[index]
        } else {
            I::null_value::<N>()
        };
        acc = I::combine::<N>(acc, value);
    }

    let _ = cube_inclusive_scan::<N, I>(acc, &mut ladder);
    if UNIT_POS == 0 {
        tile_aggregates[CUBE_POS] = ladder[CUBE_DIM - 1];
    }
}

/// Final kernel of the iterative pipeline: rescan each tile and compose the
/// precomputed inclusive prefix of the preceding tiles.
#[cube(launch_unchecked)]
pub fn scan_apply_kernel<N: Numeric, I: ScanInstruction>(
    input: &Tensor<N>,
    output: &mut Tensor<N>,
    tile_prefixes: &Tensor<N>,
    initial_value: N,
    size: u32,
    #[comptime] exclusive: bool,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut ladder = SharedMemory::<N>::new(cube_size);
    let mut items = Array::<N>::new(items_per_unit);

    let unit_base = CUBE_POS * CUBE_DIM * items_per_unit + UNIT_POS * items_per_unit;
    let (unit_exclusive, _) =
        scan_tile::<N, I>(input, &mut items, &mut ladder, unit_base, size, items_per_unit);

    let tile_prefix = if CUBE_POS > 0 {
        tile_prefixes[CUBE_POS - 1]
    } else {
        I::null_value::<N>()
    };
    let unit_prefix = I::combine::<N>(tile_prefix, unit_exclusive);
    store_tile::<N, I>(
        output,
        &items,
        unit_prefix,
        initial_value,
        unit_base,
        size,
        exclusive,
        items_per_unit,
    );
}
