pub(crate) mod kernels;

use std::time::Instant;

use cubecl_core::prelude::*;
use cubecl_core::Feature;

use crate::config::{ensure_element_supported, sync_if_debug, TileConfig, SCAN_TILE};
use crate::instructions::ScanInstruction;
use crate::lookback::init_state;
use crate::temp::{ScratchView, TempStorage, TempStorageLayout};
use crate::PrimitivesError;

use kernels::*;

/// Device-wide inclusive prefix scan: `out[i] = in[0] ⊕ … ⊕ in[i]`.
///
/// The operator may be non-commutative; operands are composed in source
/// order. `size == 0` enqueues nothing. Results are deterministic for a
/// fixed launch configuration; floating-point results may differ between
/// configurations by rounding only.
pub fn inclusive_scan<R: Runtime, N: Numeric + CubeElement, I: ScanInstruction>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    scan_impl::<R, N, I>(
        client,
        temp_storage,
        input,
        output,
        N::from_int(0),
        false,
        debug_synchronous,
    )
}

/// Device-wide exclusive prefix scan with a caller-supplied initial value:
/// `out[0] = init` and `out[i] = init ⊕ in[0] ⊕ … ⊕ in[i-1]`.
pub fn exclusive_scan<R: Runtime, N: Numeric + CubeElement, I: ScanInstruction>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    initial_value: N,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    scan_impl::<R, N, I>(
        client,
        temp_storage,
        input,
        output,
        initial_value,
        true,
        debug_synchronous,
    )
}

/// The single-pass engine publishes `(status, payload)` pairs through one
/// 64-bit atomic word, so it requires 4-byte payloads and 64-bit atomics on
/// the client. Anything else takes the iterative reduce-then-scan pipeline,
/// which has the same output contract.
pub(crate) fn use_single_pass<R: Runtime, N: CubePrimitive>(
    client: &ComputeClient<R::Server, R::Channel>,
) -> bool {
    let atomic_elem = Atomic::<u64>::as_elem_native_unchecked();
    core::mem::size_of::<N>() == 4
        && client.properties().feature_enabled(Feature::Type(atomic_elem))
}

/// Sizes of the tile-prefix arrays needed by the iterative pipeline, from
/// the bottom level up. Empty when a single tile covers the input.
pub(crate) fn scan_level_sizes(tile: TileConfig, size: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut n = tile.tiles(size) as usize;
    while n > 1 {
        sizes.push(n);
        n = tile.tiles(n) as usize;
    }
    sizes
}

fn scan_impl<R: Runtime, N: Numeric + CubeElement, I: ScanInstruction>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    input: &TensorHandleRef<R>,
    output: &TensorHandleRef<R>,
    initial_value: N,
    exclusive: bool,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    ensure_element_supported::<R, N>(client)?;
    let size = input.shape.iter().product::<usize>();
    let tile = SCAN_TILE;
    let tiles = tile.tiles(size) as usize;
    let single_pass = use_single_pass::<R, N>(client);

    let mut layout = TempStorageLayout::new();
    let mut lookback_slots = None;
    let mut level_slots = Vec::new();
    if tiles > 1 {
        if single_pass {
            let state = layout.reserve(tiles * core::mem::size_of::<u64>(), 8);
            let ticket = layout.reserve(4, 4);
            lookback_slots = Some((state, ticket));
        } else {
            for n in scan_level_sizes(tile, size) {
                level_slots.push((layout.reserve(n * core::mem::size_of::<N>(), 8), n));
            }
        }
    }

    let arena = match temp_storage.resolve(&layout)? {
        None => return Ok(()),
        Some(handle) => handle,
    };

    if size == 0 {
        return Ok(());
    }

    if debug_synchronous {
        log::debug!(
            "scan: size {size}, tiles {tiles}, single_pass {single_pass}, exclusive {exclusive}"
        );
    }

    if tiles == 1 {
        let start = Instant::now();
        unsafe {
            scan_single_kernel::launch_unchecked::<N, I, R>(
                client,
                CubeCount::new_1d(1),
                tile.cube_dim(),
                input.as_tensor_arg(1),
                output.as_tensor_arg(1),
                ScalarArg::new(initial_value),
                ScalarArg::new(size as u32),
                exclusive,
                tile.cube_size,
                tile.items_per_unit,
            );
        }
        return sync_if_debug::<R>(client, "scan_single_kernel", size, start, debug_synchronous);
    }

    if single_pass {
        let (state_slot, ticket_slot) = lookback_slots.expect("reserved above");
        let state_words = ScratchView::new(arena, state_slot, tiles * 2, 4);
        let state = ScratchView::new(arena, state_slot, tiles, 8);
        let ticket = ScratchView::new(arena, ticket_slot, 1, 4);

        let start = Instant::now();
        init_state::<R>(client, &state_words, &ticket);
        sync_if_debug::<R>(client, "init_lookback_kernel", tiles, start, debug_synchronous)?;

        let start = Instant::now();
        unsafe {
            scan_lookback_kernel::launch_unchecked::<N, I, R>(
                client,
                CubeCount::new_1d(tiles as u32),
                tile.cube_dim(),
                input.as_tensor_arg(1),
                output.as_tensor_arg(1),
                state.as_ref::<R>().as_tensor_arg(1),
                ticket.as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(initial_value),
                ScalarArg::new(size as u32),
                exclusive,
                tile.cube_size,
                tile.items_per_unit,
            );
        }
        return sync_if_debug::<R>(client, "scan_lookback_kernel", size, start, debug_synchronous);
    }

    // Iterative pipeline: per-tile reductions, inclusive scan of the
    // reductions (recursively, in place), then a rescan applying them.
    let levels = level_slots
        .iter()
        .map(|(slot, n)| ScratchView::new(arena, *slot, *n, core::mem::size_of::<N>()))
        .collect::<Vec<_>>();

    let start = Instant::now();
    unsafe {
        tile_reduce_kernel::launch_unchecked::<N, I, R>(
            client,
            CubeCount::new_1d(tiles as u32),
            tile.cube_dim(),
            input.as_tensor_arg(1),
            levels[0].as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(size as u32),
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "tile_reduce_kernel", size, start, debug_synchronous)?;

    device_scan_views::<R, N, I>(client, &levels, tile, debug_synchronous)?;

    let start = Instant::now();
    unsafe {
        scan_apply_kernel::launch_unchecked::<N, I, R>(
            client,
            CubeCount::new_1d(tiles as u32),
            tile.cube_dim(),
            input.as_tensor_arg(1),
            output.as_tensor_arg(1),
            levels[0].as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(initial_value),
            ScalarArg::new(size as u32),
            exclusive,
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "scan_apply_kernel", size, start, debug_synchronous)
}

/// Inclusive in-place scan of `levels[0]`, using the deeper levels for tile
/// prefixes. Shared with the partition engine's iterative fallback.
pub(crate) fn device_scan_views<R: Runtime, N: Numeric + CubeElement, I: ScanInstruction>(
    client: &ComputeClient<R::Server, R::Channel>,
    levels: &[ScratchView],
    tile: TileConfig,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    let size = levels[0].len();
    let tiles = tile.tiles(size) as usize;

    if tiles == 1 {
        let start = Instant::now();
        unsafe {
            scan_single_kernel::launch_unchecked::<N, I, R>(
                client,
                CubeCount::new_1d(1),
                tile.cube_dim(),
                levels[0].as_ref::<R>().as_tensor_arg(1),
                levels[0].as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(N::from_int(0)),
                ScalarArg::new(size as u32),
                false,
                tile.cube_size,
                tile.items_per_unit,
            );
        }
        return sync_if_debug::<R>(client, "scan_single_kernel", size, start, debug_synchronous);
    }

    let start = Instant::now();
    unsafe {
        tile_reduce_kernel::launch_unchecked::<N, I, R>(
            client,
            CubeCount::new_1d(tiles as u32),
            tile.cube_dim(),
            levels[0].as_ref::<R>().as_tensor_arg(1),
            levels[1].as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(size as u32),
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "tile_reduce_kernel", size, start, debug_synchronous)?;

    device_scan_views::<R, N, I>(client, &levels[1..], tile, debug_synchronous)?;

    let start = Instant::now();
    unsafe {
        scan_apply_kernel::launch_unchecked::<N, I, R>(
            client,
            CubeCount::new_1d(tiles as u32),
            tile.cube_dim(),
            levels[0].as_ref::<R>().as_tensor_arg(1),
            levels[0].as_ref::<R>().as_tensor_arg(1),
            levels[1].as_ref::<R>().as_tensor_arg(1),
            ScalarArg::new(N::from_int(0)),
            ScalarArg::new(size as u32),
            false,
            tile.cube_size,
            tile.items_per_unit,
        );
    }
    sync_if_debug::<R>(client, "scan_apply_kernel", size, start, debug_synchronous)
}
