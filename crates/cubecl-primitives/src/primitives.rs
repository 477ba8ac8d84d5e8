use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::config::MIN_PLANE_DIM;
use crate::instructions::ScanInstruction;

/// Cube-wide inclusive scan of one value per unit with a generic operator.
///
/// On return, `scratch[u]` holds the inclusive result of unit `u` and
/// `scratch[CUBE_DIM - 1]` the tile aggregate. Operands are combined in
/// ascending unit order, so non-commutative operators are safe. Every unit
/// of the cube must call this function.
#[cube]
pub(crate) fn cube_inclusive_scan<N: Numeric, I: ScanInstruction>(
    value: N,
    scratch: &mut SharedMemory<N>,
) -> N {
    scratch[UNIT_POS] = value;
    sync_cube();

    let mut acc = value;
    let mut offset = 1u32;
    while offset < CUBE_DIM {
        let mut next = acc;
        if UNIT_POS >= offset {
            next = I::combine::<N>(scratch[UNIT_POS - offset], acc);
        }
        sync_cube();
        scratch[UNIT_POS] = next;
        acc = next;
        sync_cube();
        offset *= 2;
    }
    acc
}

/// Value half of the reduce-by-key pair combinator: keep `rhs` if the right
/// operand's range starts a new segment (`rhs_count != 0`), otherwise fold.
#[cube]
pub(crate) fn combine_pair_value<V: Numeric, Rd: ScanInstruction>(
    lhs: V,
    rhs: V,
    rhs_count: u32,
) -> V {
    if rhs_count != 0 {
        rhs
    } else {
        Rd::combine::<V>(lhs, rhs)
    }
}

/// Cube-wide inclusive scan over `(segment head count, value)` pairs with
/// the reduce-by-key combinator. The first coordinate accumulates head
/// counts; the second restarts at every segment head instead of folding
/// across it. After the call both scratch arrays hold the inclusive pairs.
#[cube]
pub(crate) fn cube_inclusive_pair_scan<V: Numeric, Rd: ScanInstruction>(
    count: u32,
    value: V,
    count_scratch: &mut SharedMemory<u32>,
    value_scratch: &mut SharedMemory<V>,
) -> (u32, V) {
    count_scratch[UNIT_POS] = count;
    value_scratch[UNIT_POS] = value;
    sync_cube();

    let mut acc_count = count;
    let mut acc_value = value;
    let mut offset = 1u32;
    while offset < CUBE_DIM {
        let mut next_count = acc_count;
        let mut next_value = acc_value;
        if UNIT_POS >= offset {
            let prev_value = value_scratch[UNIT_POS - offset];
            next_count = count_scratch[UNIT_POS - offset] + acc_count;
            next_value = combine_pair_value::<V, Rd>(prev_value, acc_value, acc_count);
        }
        sync_cube();
        count_scratch[UNIT_POS] = next_count;
        value_scratch[UNIT_POS] = next_value;
        acc_count = next_count;
        acc_value = next_value;
        sync_cube();
        offset *= 2;
    }
    (acc_count, acc_value)
}

/// Cube-wide exclusive sum of one `u32` per unit built on plane intrinsics,
/// with per-plane totals combined through shared memory. The plane count
/// must not exceed the plane width. Returns the unit's exclusive sum and
/// the cube total.
///
/// `plane_sums` must hold `cube_size / MIN_PLANE_DIM + 1` entries; the last
/// slot transports the total.
#[cube]
pub(crate) fn cube_exclusive_sum(
    input: u32,
    plane_sums: &mut SharedMemory<u32>,
    #[comptime] cube_size: u32,
) -> (u32, u32) {
    let total_slot = comptime!(cube_size / MIN_PLANE_DIM);
    let log_plane = u32::find_first_set(PLANE_DIM) - 1;
    let planes = CUBE_DIM >> log_plane;

    let local = plane_exclusive_sum(input);
    if UNIT_POS_PLANE == PLANE_DIM - 1 {
        plane_sums[UNIT_POS >> log_plane] = local + input;
    }
    sync_cube();

    if (UNIT_POS >> log_plane) == 0 {
        let cond = UNIT_POS < planes;
        let prev = if cond { plane_sums[UNIT_POS] } else { 0u32.into() };
        let scanned = plane_exclusive_sum(prev);
        if cond {
            plane_sums[UNIT_POS] = scanned;
        }
    }
    sync_cube();

    let exclusive = local + plane_sums[UNIT_POS >> log_plane];
    if UNIT_POS == CUBE_DIM - 1 {
        plane_sums[total_slot] = exclusive + input;
    }
    sync_cube();
    let total = plane_sums[total_slot];
    (exclusive, total)
}

/// Count the set flags across the calling unit's plane.
#[cube]
pub(crate) fn ballot_count(flag: bool) -> u32 {
    let ones = Line::count_ones(plane_ballot(flag));
    let mut total = 0u32;
    #[unroll]
    for i in 0..4 {
        total += ones[i];
    }
    total
}

/// Flag the last item of each run of equal adjacent keys in a blocked tile.
///
/// `keys` holds `items_per_unit` consecutive items per unit. In guarded mode
/// (`use_successor == false`) the item at `valid_count - 1` is flagged as a
/// tail and anything at or past `valid_count` is left unflagged; otherwise
/// `successor_key` must carry the first key of the next tile (it is only
/// read by the last unit). `boundary` is clobbered; callers reusing it must
/// sync before the call.
#[cube]
pub(crate) fn flag_tails<K: Numeric>(
    keys: &Array<K>,
    tail_flags: &mut Array<u32>,
    boundary: &mut SharedMemory<K>,
    successor_key: K,
    use_successor: bool,
    valid_count: u32,
    #[comptime] items_per_unit: u32,
) {
    boundary[UNIT_POS] = keys[0];
    sync_cube();

    let base = UNIT_POS * items_per_unit;
    let last = comptime!(items_per_unit - 1);
    #[unroll]
    for i in 0..last {
        tail_flags[i] = tail_flag::<K>(keys[i], keys[i + 1], base + i, valid_count, use_successor);
    }

    let next_key = if UNIT_POS + 1 < CUBE_DIM {
        boundary[UNIT_POS + 1]
    } else {
        successor_key
    };
    tail_flags[last] = tail_flag::<K>(keys[last], next_key, base + last, valid_count, use_successor);
}

#[cube]
fn tail_flag<K: Numeric>(
    key: K,
    next_key: K,
    index: u32,
    valid_count: u32,
    use_successor: bool,
) -> u32 {
    let mut flag = 0u32;
    if use_successor {
        if key != next_key {
            flag = 1u32;
        }
    } else if index + 1 == valid_count || (index + 1 < valid_count && key != next_key) {
        flag = 1u32;
    }
    flag
}

/// Flag the first item of each run of equal adjacent keys in a blocked tile.
/// The first item of the tile is always flagged, and so is the item at
/// `valid_count` when the tile is partial: that phantom head closes the
/// last valid segment in the pair scan. Callers must unflag heads whose
/// rank reaches the tile's segment count before scattering. `boundary` is
/// clobbered.
#[cube]
pub(crate) fn flag_heads<K: Numeric>(
    keys: &Array<K>,
    head_flags: &mut Array<u32>,
    boundary: &mut SharedMemory<K>,
    valid_count: u32,
    #[comptime] items_per_unit: u32,
) {
    let last = comptime!(items_per_unit - 1);
    boundary[UNIT_POS] = keys[last];
    sync_cube();

    let base = UNIT_POS * items_per_unit;
    let previous_key = if UNIT_POS > 0 {
        boundary[UNIT_POS - 1]
    } else {
        keys[0]
    };
    head_flags[0] = head_flag::<K>(previous_key, keys[0], base, valid_count);
    #[unroll]
    for i in 1..items_per_unit {
        head_flags[i] = head_flag::<K>(keys[i - 1], keys[i], base + i, valid_count);
    }
}

#[cube]
fn head_flag<K: Numeric>(previous_key: K, key: K, index: u32, valid_count: u32) -> u32 {
    let mut flag = 0u32;
    if index == 0 || (index < valid_count && previous_key != key) || index == valid_count {
        flag = 1u32;
    }
    flag
}
