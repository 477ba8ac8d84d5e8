use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::config::MIN_PLANE_DIM;
use crate::instructions::Sum;
use crate::lookback::{set_complete, set_partial, wait_prefix};
use crate::ordered::ordered_cube_id;
use crate::primitives::cube_exclusive_sum;

/// Count the selected items of each tile; feeds the iterative fallback when
/// the look-back path is unavailable.
#[cube(launch_unchecked)]
pub fn flag_count_kernel(
    flags: &Tensor<u32>,
    tile_counts: &mut Tensor<u32>,
    size: u32,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut plane_sums = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM + 1));

    let unit_base = CUBE_POS * CUBE_DIM * items_per_unit + UNIT_POS * items_per_unit;
    let mut unit_count = 0u32;
    #[unroll]
    for i in 0..items_per_unit {
        let index = unit_base + i;
        if index < size && flags[index] != 0 {
            unit_count += 1u32;
        }
    }

    let (_, tile_total) = cube_exclusive_sum(unit_count, &mut plane_sums, cube_size);
    if UNIT_POS == 0 {
        tile_counts[CUBE_POS] = tile_total;
    }
}

/// Stable partition of a tile in a single pass.
///
/// Phase one ranks every item inside the tile (selected ranks ascend from
/// the front, rejected ranks from the back of the tile) and stages items in
/// a shared exchange. Phase two streams the exchange to global memory:
/// selected items to `[0, S)` in source order, rejected items to the tail
/// in reverse rejection order. The last tile stores the selected count.
///
/// With `use_lookback`, tile offsets resolve through the decoupled
/// look-back state; otherwise they are read from precomputed inclusive
/// `tile_prefixes`. With `keep_rejects` disabled the rejected region is
/// clipped and only selected items are written.
#[cube(launch_unchecked)]
pub fn partition_scatter_kernel<N: Numeric>(
    input: &Tensor<N>,
    flags: &Tensor<u32>,
    output: &mut Tensor<N>,
    selected_count: &mut Tensor<u32>,
    state: &mut Tensor<Atomic<u64>>,
    tile_prefixes: &Tensor<u32>,
    ticket: &mut Tensor<Atomic<u32>>,
    size: u32,
    #[comptime] use_lookback: bool,
    #[comptime] keep_rejects: bool,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut plane_sums = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM + 1));
    let mut exchange = SharedMemory::<N>::new(comptime!(cube_size * items_per_unit));
    let mut prefix_cell = SharedMemory::<u32>::new(1);

    let cube_id = if comptime![use_lookback] {
        ordered_cube_id(ticket)
    } else {
        CUBE_POS
    };
    let items_per_tile = CUBE_DIM * items_per_unit;
    let tile_offset = cube_id * items_per_tile;
    let number_of_tiles = (size + items_per_tile - 1) / items_per_tile;
    let last_tile = cube_id == number_of_tiles - 1;
    let valid_in_tile = if last_tile {
        size - tile_offset
    } else {
        items_per_tile
    };

    let unit_base = tile_offset + UNIT_POS * items_per_unit;
    let mut values = Array::<N>::new(items_per_unit);
    let mut selected = Array::<u32>::new(items_per_unit);
    let mut unit_count = 0u32;
    #[unroll]
    for i in 0..items_per_unit {
        let index = unit_base + i;
        let flag = if index < size { flags[index] } else { 0u32.into() };
        values[i] = if index < size {
            input[index]
        } else {
            N::from_int(0)
        };
        selected[i] = u32::cast_from(flag != 0);
        unit_count += selected[i];
    }

    let (unit_exclusive, selected_in_tile) =
        cube_exclusive_sum(unit_count, &mut plane_sums, cube_size);

    // Exclusive count of selected items in all preceding tiles.
    if UNIT_POS == 0 {
        if comptime![use_lookback] {
            if cube_id == 0 {
                set_complete::<u32>(state, 0u32, selected_in_tile);
                prefix_cell[0] = 0u32;
            } else {
                set_partial::<u32>(state, cube_id, selected_in_tile);
                let prefix = wait_prefix::<u32, Sum>(state, cube_id);
                set_complete::<u32>(state, cube_id, prefix + selected_in_tile);
                prefix_cell[0] = prefix;
            }
        } else {
            if cube_id > 0 {
                prefix_cell[0] = tile_prefixes[cube_id - 1];
            } else {
                prefix_cell[0] = 0u32;
            }
        }
    }
    sync_cube();
    let selected_prefix = prefix_cell[0];

    // Stage into shared memory: selected compact at the front, rejected
    // behind them in source order.
    let mut running = unit_exclusive;
    #[unroll]
    for i in 0..items_per_unit {
        let item_index = UNIT_POS * items_per_unit + i;
        let selected_index = running;
        let rejected_index = item_index - selected_index + selected_in_tile;
        let scatter_index = if selected[i] != 0 {
            selected_index
        } else {
            rejected_index
        };
        exchange[scatter_index] = values[i];
        running += selected[i];
    }
    sync_cube();

    // Stream the exchange out with striped accesses.
    #[unroll]
    for i in 0..items_per_unit {
        let item_index = i * CUBE_DIM + UNIT_POS;
        let is_valid = item_index < valid_in_tile;
        if item_index < selected_in_tile {
            output[selected_prefix + item_index] = exchange[item_index];
        } else {
            if comptime![keep_rejects] {
                if is_valid {
                    let rejected_index = item_index - selected_in_tile;
                    let rejected_prefix = tile_offset - selected_prefix;
                    output[size - (rejected_prefix + rejected_index + 1u32)] = exchange[item_index];
                }
            }
        }
    }

    if last_tile && UNIT_POS == 0 {
        selected_count[0] = selected_prefix + selected_in_tile;
    }
}
