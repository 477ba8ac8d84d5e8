use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::config::MIN_PLANE_DIM;
use crate::primitives::cube_exclusive_sum;

use super::key::{RadixBits, RadixKey};

/// Digit of `key` in the current pass window. Descending sorts complement
/// the transformed pattern, which reverses the order digit by digit.
#[cube]
fn radix_digit<K: RadixKey>(key: K, bit_start: u32, mask: u32, #[comptime] descending: bool) -> u32 {
    let bits = K::to_radix(&key);
    if comptime![descending] {
        let flipped = K::Radix::flip(&bits);
        K::Radix::digit(&flipped, bit_start, mask)
    } else {
        K::Radix::digit(&bits, bit_start, mask)
    }
}

/// Per-tile digit histogram of one pass, accumulated through shared atomic
/// counters. One unit per item, one unit per digit; the cube size must
/// equal the radix.
#[cube(launch_unchecked)]
pub fn radix_histogram_kernel<K: RadixKey>(
    keys: &Tensor<K>,
    histograms: &mut Tensor<u32>,
    bit_start: u32,
    mask: u32,
    size: u32,
    #[comptime] descending: bool,
    #[comptime] radix: u32,
) {
    let mut histogram = SharedMemory::<Atomic<u32>>::new(radix);

    Atomic::store(&histogram[UNIT_POS], 0u32);
    sync_cube();

    let index = CUBE_POS * CUBE_DIM + UNIT_POS;
    if index < size {
        let digit = radix_digit::<K>(keys[index], bit_start, mask, descending);
        Atomic::add(&histogram[digit], 1u32);
    }
    sync_cube();

    histograms[CUBE_POS * radix + UNIT_POS] = Atomic::load(&histogram[UNIT_POS]);
}

/// Turn the per-tile histograms into global scatter bases, in place. Each
/// unit owns one digit: it totals the digit across tiles, the cube scans
/// the totals, and the per-tile counts are rewritten as running offsets.
#[cube(launch_unchecked)]
pub fn radix_offsets_kernel(
    histograms: &mut Tensor<u32>,
    tiles: u32,
    #[comptime] radix: u32,
    #[comptime] cube_size: u32,
) {
    let mut plane_sums = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM + 1));

    let digit = UNIT_POS;
    let mut total = 0u32;
    let mut tile = 0u32;
    while tile < tiles {
        total += histograms[tile * radix + digit];
        tile += 1;
    }

    let (digit_offset, _) = cube_exclusive_sum(total, &mut plane_sums, cube_size);

    let mut running = digit_offset;
    let mut tile = 0u32;
    while tile < tiles {
        let count = histograms[tile * radix + digit];
        histograms[tile * radix + digit] = running;
        running += count;
        tile += 1;
    }
}

/// Stable scatter of one pass: each item's destination is its tile's base
/// for the digit plus the item's rank among equal digits earlier in the
/// tile, so equal keys keep their relative order.
#[allow(clippy::too_many_arguments)]
#[cube(launch_unchecked)]
pub fn radix_scatter_kernel<K: RadixKey, V: Numeric>(
    keys_in: &Tensor<K>,
    keys_out: &mut Tensor<K>,
    values_in: &Tensor<V>,
    values_out: &mut Tensor<V>,
    offsets: &Tensor<u32>,
    bit_start: u32,
    mask: u32,
    size: u32,
    #[comptime] descending: bool,
    #[comptime] with_values: bool,
    #[comptime] radix: u32,
    #[comptime] cube_size: u32,
) {
    let mut digits = SharedMemory::<u32>::new(cube_size);

    let index = CUBE_POS * CUBE_DIM + UNIT_POS;
    let digit = if index < size {
        radix_digit::<K>(keys_in[index], bit_start, mask, descending)
    } else {
        // Sentinel outside any masked digit, so padding never matches a
        // valid rank.
        0xFFFF_FFFFu32.into()
    };
    digits[UNIT_POS] = digit;
    sync_cube();

    let mut rank = 0u32;
    let mut i = 0u32;
    while i < UNIT_POS {
        if digits[i] == digit {
            rank += 1u32;
        }
        i += 1;
    }

    if index < size {
        let position = offsets[CUBE_POS * radix + digit] + rank;
        keys_out[position] = keys_in[index];
        if comptime![with_values] {
            values_out[position] = values_in[index];
        }
    }
}

/// One digit pass over every segment, one cube per segment. The cube builds
/// the segment's digit histogram, scans it into bucket bases, then walks
/// the segment tile by tile keeping per-digit running counters so the
/// scatter stays stable. Segments are disjoint, so no cross-cube
/// coordination is needed.
#[allow(clippy::too_many_arguments)]
#[cube(launch_unchecked)]
pub fn segmented_radix_pass_kernel<K: RadixKey, V: Numeric>(
    keys_in: &Tensor<K>,
    keys_out: &mut Tensor<K>,
    values_in: &Tensor<V>,
    values_out: &mut Tensor<V>,
    begin_offsets: &Tensor<u32>,
    end_offsets: &Tensor<u32>,
    bit_start: u32,
    mask: u32,
    #[comptime] descending: bool,
    #[comptime] with_values: bool,
    #[comptime] radix: u32,
    #[comptime] cube_size: u32,
) {
    let mut histogram = SharedMemory::<Atomic<u32>>::new(radix);
    let mut bucket_offsets = SharedMemory::<u32>::new(radix);
    let mut counters = SharedMemory::<u32>::new(radix);
    let mut tile_digits = SharedMemory::<u32>::new(cube_size);
    let mut plane_sums = SharedMemory::<u32>::new(comptime!(cube_size / MIN_PLANE_DIM + 1));

    let segment = CUBE_POS;
    let begin = begin_offsets[segment];
    let end = end_offsets[segment];
    let length = end - begin;

    Atomic::store(&histogram[UNIT_POS], 0u32);
    sync_cube();

    let mut item = UNIT_POS;
    while item < length {
        let digit = radix_digit::<K>(keys_in[begin + item], bit_start, mask, descending);
        Atomic::add(&histogram[digit], 1u32);
        item += CUBE_DIM;
    }
    sync_cube();

    let (digit_offset, _) =
        cube_exclusive_sum(Atomic::load(&histogram[UNIT_POS]), &mut plane_sums, cube_size);
    bucket_offsets[UNIT_POS] = digit_offset;
    counters[UNIT_POS] = 0u32;
    Atomic::store(&histogram[UNIT_POS], 0u32);
    sync_cube();

    let tiles = (length + CUBE_DIM - 1) / CUBE_DIM;
    let mut tile = 0u32;
    while tile < tiles {
        let item = tile * CUBE_DIM + UNIT_POS;
        let valid = item < length;
        let digit = if valid {
            radix_digit::<K>(keys_in[begin + item], bit_start, mask, descending)
        } else {
            0xFFFF_FFFFu32
        };
        tile_digits[UNIT_POS] = digit;
        if valid {
            Atomic::add(&histogram[digit], 1u32);
        }
        sync_cube();

        let mut rank = 0u32;
        let mut i = 0u32;
        while i < UNIT_POS {
            if tile_digits[i] == digit {
                rank += 1u32;
            }
            i += 1;
        }

        if valid {
            let position = begin + bucket_offsets[digit] + counters[digit] + rank;
            keys_out[position] = keys_in[begin + item];
            if comptime![with_values] {
                values_out[position] = values_in[begin + item];
            }
        }
        sync_cube();

        counters[UNIT_POS] += Atomic::load(&histogram[UNIT_POS]);
        Atomic::store(&histogram[UNIT_POS], 0u32);
        sync_cube();

        tile += 1;
    }
}
