pub(crate) mod kernels;

use std::time::Instant;

use cubecl_core::prelude::*;

use crate::config::{ensure_element_supported, sync_if_debug, REDUCE_BY_KEY_TILE};
use crate::instructions::ScanInstruction;
use crate::lookback::clear_counts;
use crate::temp::{ScratchView, TempStorage, TempStorageLayout};
use crate::PrimitivesError;

use kernels::*;

/// Upper bound on the batch count so every carry-out record fits a single
/// fix-up cube.
pub(crate) const MAX_BATCHES: u32 = 128;
const FIXUP_CUBE_SIZE: u32 = 128;

/// Split `tiles` into contiguous batches: `(batches, blocks_per_full_batch,
/// full_batches)`. Every batch owns at least one tile whenever there are
/// tiles at all.
pub(crate) fn batch_layout(tiles: u32) -> (u32, u32, u32) {
    let batches = tiles.clamp(1, MAX_BATCHES);
    let blocks_per_full_batch = Ord::max(tiles.div_ceil(batches), 1);
    let full_batches = tiles - (blocks_per_full_batch - 1) * batches;
    (batches, blocks_per_full_batch, full_batches)
}

/// Device-wide reduce-by-key.
///
/// For every maximal run of equal adjacent keys, writes the run's key to
/// `unique_output` and the reduction of its values (in strict source order,
/// so non-commutative operators are safe) to `aggregates_output`. The
/// number of runs is stored to `unique_count_output` (one `u32`). Outputs
/// must have room for the worst case of `size` runs.
#[allow(clippy::too_many_arguments)]
pub fn reduce_by_key<
    R: Runtime,
    K: Numeric + CubeElement,
    V: Numeric + CubeElement,
    Rd: ScanInstruction,
>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    values_input: &TensorHandleRef<R>,
    unique_output: &TensorHandleRef<R>,
    aggregates_output: &TensorHandleRef<R>,
    unique_count_output: &TensorHandleRef<R>,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    ensure_element_supported::<R, K>(client)?;
    ensure_element_supported::<R, V>(client)?;
    let size = keys_input.shape.iter().product::<usize>();
    let tile = REDUCE_BY_KEY_TILE;
    let tiles = tile.tiles(size);
    let (batches, blocks_per_full_batch, full_batches) = batch_layout(tiles);

    let mut layout = TempStorageLayout::new();
    let counts_slot = layout.reserve(batches as usize * 4, 8);
    let carry_keys_slot = layout.reserve(batches as usize * core::mem::size_of::<K>(), 8);
    let carry_values_slot = layout.reserve(batches as usize * core::mem::size_of::<V>(), 8);
    let carry_destinations_slot = layout.reserve(batches as usize * 4, 8);
    let carry_is_final_slot = layout.reserve(batches as usize * 4, 8);

    let arena = match temp_storage.resolve(&layout)? {
        None => return Ok(()),
        Some(handle) => handle,
    };

    if size == 0 {
        clear_counts::<R>(client, unique_count_output);
        let start = Instant::now();
        return sync_if_debug::<R>(client, "clear_counts", 0, start, debug_synchronous);
    }

    if debug_synchronous {
        log::debug!(
            "reduce_by_key: size {size}, tiles {tiles}, batches {batches}, \
             blocks_per_full_batch {blocks_per_full_batch}, full_batches {full_batches}"
        );
    }

    let unique_counts = ScratchView::new(arena, counts_slot, batches as usize, 4);
    let carry_keys = ScratchView::new(
        arena,
        carry_keys_slot,
        batches as usize,
        core::mem::size_of::<K>(),
    );
    let carry_values = ScratchView::new(
        arena,
        carry_values_slot,
        batches as usize,
        core::mem::size_of::<V>(),
    );
    let carry_destinations = ScratchView::new(arena, carry_destinations_slot, batches as usize, 4);
    let carry_is_final = ScratchView::new(arena, carry_is_final_slot, batches as usize, 4);

    let start = Instant::now();
    unsafe {
        unique_count_kernel::launch_unchecked::<K, R>(
            client,
            CubeCount::new_1d(batches),
            tile.cube_dim(),
            keys_input.as_tensor_arg(1),
            unique_counts.as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(size as u32),
            ScalarArg::new(blocks_per_full_batch),
            ScalarArg::new(full_batches),
            ScalarArg::new(tiles),
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "unique_count_kernel", size, start, debug_synchronous)?;

    let start = Instant::now();
    unsafe {
        scan_unique_counts_kernel::launch_unchecked::<R>(
            client,
            CubeCount::new_1d(1),
            CubeDim::new_1d(FIXUP_CUBE_SIZE),
            unique_counts.as_ref::<R>().as_tensor_arg(1),
            unique_count_output.as_tensor_arg(1),
            ScalarArg::new(batches),
            FIXUP_CUBE_SIZE,
        );
    }
    sync_if_debug::<R>(
        client,
        "scan_unique_counts_kernel",
        batches as usize,
        start,
        debug_synchronous,
    )?;

    let start = Instant::now();
    unsafe {
        reduce_by_key_kernel::launch_unchecked::<K, V, Rd, R>(
            client,
            CubeCount::new_1d(batches),
            tile.cube_dim(),
            keys_input.as_tensor_arg(1),
            values_input.as_tensor_arg(1),
            unique_counts.as_ref::<R>().as_tensor_arg(1),
            unique_output.as_tensor_arg(1),
            aggregates_output.as_tensor_arg(1),
            carry_keys.as_ref::<R>().as_tensor_arg(1),
            carry_values.as_ref::<R>().as_tensor_arg(1),
            carry_destinations.as_ref::<R>().as_tensor_arg(1),
            carry_is_final.as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(size as u32),
            ScalarArg::new(blocks_per_full_batch),
            ScalarArg::new(full_batches),
            ScalarArg::new(tiles),
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "reduce_by_key_kernel", size, start, debug_synchronous)?;

    if batches > 1 {
        let start = Instant::now();
        unsafe {
            carry_out_fixup_kernel::launch_unchecked::<K, V, Rd, R>(
                client,
                CubeCount::new_1d(1),
                CubeDim::new_1d(FIXUP_CUBE_SIZE),
                carry_keys.as_ref::<R>().as_tensor_arg(1),
                carry_values.as_ref::<R>().as_tensor_arg(1),
                carry_destinations.as_ref::<R>().as_tensor_arg(1),
                carry_is_final.as_ref::<R>().as_tensor_arg(1),
                aggregates_output.as_tensor_arg(1),
                ScalarArg::new(batches),
                FIXUP_CUBE_SIZE,
            );
        }
        sync_if_debug::<R>(
            client,
            "carry_out_fixup_kernel",
            batches as usize,
            start,
            debug_synchronous,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod host_tests {
    use super::*;

    #[test]
    fn batches_cover_all_tiles() {
        for tiles in [0u32, 1, 2, 64, 127, 128, 129, 1000, 100_000] {
            let (batches, bpfb, full) = batch_layout(tiles);
            assert!(batches >= 1 && batches <= MAX_BATCHES);
            assert_eq!(full * bpfb + (batches - full) * (bpfb - 1), tiles);
            // Every batch owns at least one tile, so every carry-out record
            // is written.
            assert!(bpfb >= 1);
            assert!(batches <= tiles.max(1));
        }
    }
}
