pub(crate) mod kernels;

use std::time::Instant;

use cubecl_core::prelude::*;

use crate::config::{ensure_element_supported, sync_if_debug, PARTITION_TILE};
use crate::instructions::Sum;
use crate::lookback::{clear_counts, init_state};
use crate::scan::{device_scan_views, scan_level_sizes, use_single_pass};
use crate::temp::{ScratchView, TempStorage, TempStorageLayout};
use crate::PrimitivesError;

use kernels::*;

/// Stable partition by a 0/1 flag stream.
///
/// Selected items land in `output[0, S)` in source order; rejected items
/// fill the tail of `output` in reverse rejection order. Exactly `size`
/// items are written and `S` is stored to `selected_count` (one `u32`).
pub fn partition_flagged<R: Runtime, N: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    flags: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    selected_count: &TensorHandleRef<R>,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    partition_impl::<R, N>(
        client,
        temp_storage,
        input,
        flags,
        output,
        selected_count,
        true,
        debug_synchronous,
    )
}

/// Stable selection by a 0/1 flag stream: like [`partition_flagged`] with
/// the rejected tail clipped, so only `[0, S)` of `output` is written.
pub fn select_flagged<R: Runtime, N: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    flags: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    selected_count: &TensorHandleRef<R>,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    partition_impl::<R, N>(
        client,
        temp_storage,
        input,
        flags,
        output,
        selected_count,
        false,
        debug_synchronous,
    )
}

#[allow(clippy::too_many_arguments)]
fn partition_impl<R: Runtime, N: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    flags: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    selected_count: &TensorHandleRef<R>,
    keep_rejects: bool,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    ensure_element_supported::<R, N>(client)?;
    let size = input.shape.iter().product::<usize>();
    let tile = PARTITION_TILE;
    let tiles = tile.tiles(size) as usize;
    // Offsets are u32 counts, so only the 64-bit atomic feature gates the
    // single-pass path here.
    let single_pass = use_single_pass::<R, u32>(client);

    let mut layout = TempStorageLayout::new();
    let mut level_slots = Vec::new();
    let (state_slot, ticket_slot) = if single_pass {
        (
            layout.reserve(tiles.max(1) * core::mem::size_of::<u64>(), 8),
            layout.reserve(4, 4),
        )
    } else {
        let slots = (layout.reserve(8, 8), layout.reserve(4, 4));
        for n in scan_level_sizes(tile, size) {
            level_slots.push((layout.reserve(n * 4, 8), n));
        }
        slots
    };

    let arena = match temp_storage.resolve(&layout)? {
        None => return Ok(()),
        Some(handle) => handle,
    };

    if size == 0 {
        clear_counts::<R>(client, selected_count);
        let start = Instant::now();
        return sync_if_debug::<R>(client, "clear_counts", 0, start, debug_synchronous);
    }

    let ticket = ScratchView::new(arena, ticket_slot, 1, 4);

    if single_pass {
        let state_words = ScratchView::new(arena, state_slot, tiles * 2, 4);
        let state = ScratchView::new(arena, state_slot, tiles, 8);

        let start = Instant::now();
        init_state::<R>(client, &state_words, &ticket);
        sync_if_debug::<R>(client, "init_lookback_kernel", tiles, start, debug_synchronous)?;

        let start = Instant::now();
        unsafe {
            partition_scatter_kernel::launch_unchecked::<N, R>(
                client,
                CubeCount::new_1d(tiles as u32),
                tile.cube_dim(),
                input.as_tensor_arg(1),
                flags.as_tensor_arg(1),
                output.as_tensor_arg(1),
                selected_count.as_tensor_arg(1),
                state.as_ref::<R>().as_tensor_arg(1),
                // The precomputed-prefix input is unused on this path.
                ticket.as_ref::<R>().as_tensor_arg(1),
                ticket.as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(size as u32),
                true,
                keep_rejects,
                tile.cube_size,
                tile.items_per_unit,
            );
        }
        return sync_if_debug::<R>(
            client,
            "partition_scatter_kernel",
            size,
            start,
            debug_synchronous,
        );
    }

    // Iterative fallback: count selected items per tile, scan the counts,
    // then scatter against the precomputed tile prefixes.
    let state_dummy = ScratchView::new(arena, state_slot, 1, 8);
    let levels = level_slots
        .iter()
        .map(|(slot, n)| ScratchView::new(arena, *slot, *n, 4))
        .collect::<Vec<_>>();

    if !levels.is_empty() {
        let start = Instant::now();
        unsafe {
            flag_count_kernel::launch_unchecked::<R>(
                client,
                CubeCount::new_1d(tiles as u32),
                tile.cube_dim(),
                flags.as_tensor_arg(1),
                levels[0].as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(size as u32),
                tile.cube_size,
                tile.items_per_unit,
            );
        }
        sync_if_debug::<R>(client, "flag_count_kernel", size, start, debug_synchronous)?;

        device_scan_views::<R, u32, Sum>(client, &levels, tile, debug_synchronous)?;
    }

    let prefixes = if levels.is_empty() { &ticket } else { &levels[0] };
    let start = Instant::now();
    unsafe {
        partition_scatter_kernel::launch_unchecked::<N, R>(
            client,
            CubeCount::new_1d(tiles as u32),
            tile.cube_dim(),
            input.as_tensor_arg(1),
            flags.as_tensor_arg(1),
            output.as_tensor_arg(1),
            selected_count.as_tensor_arg(1),
            state_dummy.as_ref::<R>().as_tensor_arg(1),
            prefixes.as_ref::<R>().as_tensor_arg(1),
            ticket.as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(size as u32),
            false,
            keep_rejects,
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(
        client,
        "partition_scatter_kernel",
        size,
        start,
        debug_synchronous,
    )
}
