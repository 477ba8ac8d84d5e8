use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::config::MIN_PLANE_DIM;
use crate::instructions::ScanInstruction;
use crate::primitives::{
    ballot_count, combine_pair_value, cube_exclusive_sum, cube_inclusive_pair_scan, flag_heads,
    flag_tails,
};

/// Split a batch id into its run of contiguous tiles. The first
/// `full_batches` batches own `blocks_per_full_batch` tiles, the rest one
/// fewer.
#[cube]
fn batch_tiles(
    batch_id: u32,
    blocks_per_full_batch: u32,
    full_batches: u32,
) -> (u32, u32) {
    if batch_id < full_batches {
        (batch_id * blocks_per_full_batch, blocks_per_full_batch)
    } else {
        (
            batch_id * (blocks_per_full_batch - 1) + full_batches,
            blocks_per_full_batch - 1,
        )
    }
}

/// Kernel A: every batch walks its tiles, flags run tails with the guarded
/// predicate (the input's last item always counts as a tail) and
/// accumulates per-plane tail counts with ballots. One count per batch.
#[cube(launch_unchecked)]
pub fn unique_count_kernel<K: Numeric>(
    keys: &Tensor<K>,
    unique_counts: &mut Tensor<u32>,
    size: u32,
    blocks_per_full_batch: u32,
    full_batches: u32,
    tiles: u32,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut boundary = SharedMemory::<K>::new(cube_size);
    let mut plane_counts = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM));

    let batch_id = CUBE_POS;
    let items_per_tile = CUBE_DIM * items_per_unit;
    let (first_tile, tiles_in_batch) = batch_tiles(batch_id, blocks_per_full_batch, full_batches);

    let mut keys_local = Array::<K>::new(items_per_unit);
    let mut tail_flags = Array::<u32>::new(items_per_unit);
    let mut plane_count = 0u32;

    let mut tile_id = first_tile;
    let mut bi = 0u32;
    while bi < tiles_in_batch {
        let tile_offset = tile_id * items_per_tile;
        let valid_count = if tile_offset + items_per_tile <= size {
            items_per_tile
        } else {
            size - tile_offset
        };

        let unit_base = tile_offset + UNIT_POS * items_per_unit;
        #[unroll]
        for i in 0..items_per_unit {
            let index = unit_base + i;
            keys_local[i] = if index < size {
                keys[index]
            } else {
                K::from_int(0)
            };
        }

        let last_tile = tile_id == tiles - 1;
        let successor_key = if UNIT_POS == CUBE_DIM - 1 && !last_tile {
            keys[tile_offset + items_per_tile]
        } else {
            K::from_int(0)
        };
        flag_tails::<K>(
            &keys_local,
            &mut tail_flags,
            &mut boundary,
            successor_key,
            !last_tile,
            valid_count,
            items_per_unit,
        );

        #[unroll]
        for i in 0..items_per_unit {
            plane_count += ballot_count(tail_flags[i] != 0);
        }

        tile_id += 1;
        bi += 1;
        sync_cube();
    }

    if UNIT_POS_PLANE == 0 {
        plane_counts[UNIT_POS / PLANE_DIM] = plane_count;
    }
    sync_cube();

    if UNIT_POS == 0 {
        let planes = CUBE_DIM / PLANE_DIM;
        let mut batch_count = 0u32;
        let mut p = 0u32;
        while p < planes {
            batch_count += plane_counts[p];
            p += 1;
        }
        unique_counts[batch_id] = batch_count;
    }
}

/// Kernel B: exclusive scan of the per-batch unique counts, in place, and
/// the total count to the caller's output. A single cube covers every
/// batch.
#[cube(launch_unchecked)]
pub fn scan_unique_counts_kernel(
    unique_counts: &mut Tensor<u32>,
    unique_count_output: &mut Tensor<u32>,
    batches: u32,
    #[comptime] cube_size: u32,
) {
    let mut plane_sums = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM + 1));

    let value = if UNIT_POS < batches {
        unique_counts[UNIT_POS]
    } else {
        0u32
    };
    let (exclusive, total) = cube_exclusive_sum(value, &mut plane_sums, cube_size);
    if UNIT_POS < batches {
        unique_counts[UNIT_POS] = exclusive;
    }
    if UNIT_POS == 0 {
        unique_count_output[0] = total;
    }
}

/// Kernel C: every batch rewalks its tiles. Head and tail flags drive a
/// non-commutative inclusive pair scan whose first coordinate yields the
/// 1-based segment index inside the tile and whose second yields the
/// segmented scan value. Keys of heads and scanned values of tails scatter
/// to the unique/aggregate outputs; carries chain tiles within a batch
/// through shared memory and batches through per-batch carry-out records.
#[allow(clippy::too_many_arguments)]
#[cube(launch_unchecked)]
pub fn reduce_by_key_kernel<K: Numeric, V: Numeric, Rd: ScanInstruction>(
    keys: &Tensor<K>,
    values: &Tensor<V>,
    unique_starts: &Tensor<u32>,
    unique_output: &mut Tensor<K>,
    aggregates_output: &mut Tensor<V>,
    carry_keys: &mut Tensor<K>,
    carry_values: &mut Tensor<V>,
    carry_destinations: &mut Tensor<u32>,
    carry_is_final: &mut Tensor<u32>,
    size: u32,
    blocks_per_full_batch: u32,
    full_batches: u32,
    tiles: u32,
    #[comptime] cube_size: u32,
    #[comptime] items_per_unit: u32,
) {
    let mut boundary = SharedMemory::<K>::new(cube_size);
    let mut count_scratch = SharedMemory::<u32>::new(cube_size);
    let mut value_scratch = SharedMemory::<V>::new(cube_size);
    // [0]: unique count of the current tile, [1]: segment crosses into the
    // next tile.
    let mut tile_state = SharedMemory::<u32>::new(2);
    let mut carry_cell = SharedMemory::<V>::new(1);

    let batch_id = CUBE_POS;
    let items_per_tile = CUBE_DIM * items_per_unit;
    let (first_tile, tiles_in_batch) = batch_tiles(batch_id, blocks_per_full_batch, full_batches);
    let mut block_start = unique_starts[batch_id];

    if UNIT_POS == 0 {
        // Does the previous batch end mid-segment?
        let continues = first_tile > 0
            && tiles_in_batch > 0
            && keys[first_tile * items_per_tile - 1] == keys[first_tile * items_per_tile];
        tile_state[1] = u32::cast_from(continues);
    }

    let mut keys_local = Array::<K>::new(items_per_unit);
    let mut values_local = Array::<V>::new(items_per_unit);
    let mut head_flags = Array::<u32>::new(items_per_unit);
    let mut tail_flags = Array::<u32>::new(items_per_unit);
    let mut counts = Array::<u32>::new(items_per_unit);
    let mut ranks = Array::<u32>::new(items_per_unit);
    let mut scanned = Array::<V>::new(items_per_unit);

    let last_item = comptime!(items_per_unit - 1);

    let mut tile_id = first_tile;
    let mut bi = 0u32;
    while bi < tiles_in_batch {
        let tile_offset = tile_id * items_per_tile;
        let valid_count = if tile_offset + items_per_tile <= size {
            items_per_tile
        } else {
            size - tile_offset
        };

        let unit_base = tile_offset + UNIT_POS * items_per_unit;
        #[unroll]
        for i in 0..items_per_unit {
            let index = unit_base + i;
            keys_local[i] = if index < size {
                keys[index]
            } else {
                K::from_int(0)
            };
            values_local[i] = if index < size {
                values[index]
            } else {
                Rd::null_value::<V>()
            };
        }

        flag_heads::<K>(
            &keys_local,
            &mut head_flags,
            &mut boundary,
            valid_count,
            items_per_unit,
        );
        sync_cube();

        let last_tile = tile_id == tiles - 1;
        let successor_key = if UNIT_POS == CUBE_DIM - 1 && !last_tile {
            keys[tile_offset + items_per_tile]
        } else {
            K::from_int(0)
        };
        flag_tails::<K>(
            &keys_local,
            &mut tail_flags,
            &mut boundary,
            successor_key,
            !last_tile,
            valid_count,
            items_per_unit,
        );

        // Unit-local inclusive pair scan, then cube-wide over the unit
        // aggregates.
        let mut acc_count = head_flags[0];
        let mut acc_value = values_local[0];
        counts[0] = acc_count;
        scanned[0] = acc_value;
        #[unroll]
        for i in 1..items_per_unit {
            let head = head_flags[i];
            acc_value = combine_pair_value::<V, Rd>(acc_value, values_local[i], head);
            acc_count += head;
            counts[i] = acc_count;
            scanned[i] = acc_value;
        }

        let _ = cube_inclusive_pair_scan::<V, Rd>(
            acc_count,
            acc_value,
            &mut count_scratch,
            &mut value_scratch,
        );
        let unit_exclusive_count = if UNIT_POS > 0 {
            count_scratch[UNIT_POS - 1]
        } else {
            0u32
        };
        let unit_exclusive_value = if UNIT_POS > 0 {
            value_scratch[UNIT_POS - 1]
        } else {
            Rd::null_value::<V>()
        };

        // The first item of the tile is always a head, so segment indices
        // start at one and ranks at zero.
        #[unroll]
        for i in 0..items_per_unit {
            ranks[i] = unit_exclusive_count + counts[i] - 1;
            scanned[i] = combine_pair_value::<V, Rd>(unit_exclusive_value, scanned[i], counts[i]);
        }

        if UNIT_POS == CUBE_DIM - 1 {
            tile_state[0] = ranks[last_item] + tail_flags[last_item];
        }
        sync_cube();
        let unique_count = tile_state[0];
        let continues_in = tile_state[1];

        // Apply the carry of the previous tile to the leading segment.
        if bi > 0 && continues_in != 0 {
            let carry_in = carry_cell[0];
            #[unroll]
            for i in 0..items_per_unit {
                if ranks[i] == 0 {
                    scanned[i] = Rd::combine::<V>(carry_in, scanned[i]);
                }
            }
        }
        if UNIT_POS == 0 {
            // A continued segment's key was already written by an earlier
            // tile or batch.
            head_flags[0] = u32::cast_from(continues_in == 0);
        }
        if last_tile {
            // Unflag the phantom head past the last valid item; its rank
            // points one past the tile's output range.
            #[unroll]
            for i in 0..items_per_unit {
                if ranks[i] >= unique_count {
                    head_flags[i] = 0u32;
                }
            }
        }

        sync_cube();
        if UNIT_POS == CUBE_DIM - 1 {
            if bi == tiles_in_batch - 1 {
                carry_keys[batch_id] = keys_local[last_item];
                carry_values[batch_id] = scanned[last_item];
                carry_destinations[batch_id] = block_start + ranks[last_item];
                carry_is_final[batch_id] = tail_flags[last_item];
            } else {
                tile_state[1] = u32::cast_from(tail_flags[last_item] == 0);
                carry_cell[0] = scanned[last_item];
            }
        }

        // Unique keys from heads, aggregates from tails. Tail aggregates of
        // segments crossing a batch boundary are partial and fixed up by
        // the carry-out pass.
        #[unroll]
        for i in 0..items_per_unit {
            if head_flags[i] != 0 {
                unique_output[block_start + ranks[i]] = keys_local[i];
            }
            if tail_flags[i] != 0 {
                aggregates_output[block_start + ranks[i]] = scanned[i];
            }
        }

        block_start += unique_count;
        tile_id += 1;
        bi += 1;
        sync_cube();
    }
}

/// Kernel D: a single cube scans the batch carry-outs with the same pair
/// combinator and scatters finished chains back into the aggregates. When
/// the next batch began a new segment the scanned value overwrites the
/// aggregate, otherwise it is folded in from the left.
#[cube(launch_unchecked)]
pub fn carry_out_fixup_kernel<K: Numeric, V: Numeric, Rd: ScanInstruction>(
    carry_keys: &Tensor<K>,
    carry_values: &Tensor<V>,
    carry_destinations: &Tensor<u32>,
    carry_is_final: &Tensor<u32>,
    aggregates_output: &mut Tensor<V>,
    batches: u32,
    #[comptime] cube_size: u32,
) {
    let mut count_scratch = SharedMemory::<u32>::new(cube_size);
    let mut value_scratch = SharedMemory::<V>::new(cube_size);
    let mut key_exchange = SharedMemory::<K>::new(cube_size);

    // The last batch's carry-out leads nowhere: its tail was final by
    // construction, so only `batches - 1` records participate.
    let valid_count = batches - 1;
    let index = UNIT_POS;

    let key = if index < batches {
        carry_keys[index]
    } else {
        carry_keys[0]
    };
    let value = if index < valid_count {
        carry_values[index]
    } else {
        Rd::null_value::<V>()
    };
    key_exchange[index] = key;
    sync_cube();

    let previous_key = if index > 0 { key_exchange[index - 1] } else { key };
    let next_key = if index + 1 < CUBE_DIM {
        key_exchange[index + 1]
    } else {
        key
    };
    let head = index < valid_count && (index == 0 || previous_key != key);
    let tail = index + 1 == valid_count || (index + 1 < valid_count && key != next_key);

    sync_cube();
    let (_, scanned) = cube_inclusive_pair_scan::<V, Rd>(
        u32::cast_from(head),
        value,
        &mut count_scratch,
        &mut value_scratch,
    );

    if index < valid_count && tail {
        let destination = carry_destinations[index];
        if carry_is_final[index] != 0 {
            aggregates_output[destination] = scanned;
        } else {
            aggregates_output[destination] =
                Rd::combine::<V>(scanned, aggregates_output[destination]);
        }
    }
}
