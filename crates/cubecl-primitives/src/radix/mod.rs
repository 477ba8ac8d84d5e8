pub(crate) mod kernels;
mod key;

use std::time::Instant;

use cubecl_core::prelude::*;
use cubecl_runtime::server::Handle;

use crate::config::{ensure_element_supported, sync_if_debug, RADIX_TILE};
use crate::temp::{ScratchView, TempStorage, TempStorageLayout};
use crate::PrimitivesError;

use kernels::*;
pub use key::{RadixBits, RadixKey};

/// Bits consumed per digit pass. The last pass of a bit window narrower
/// than a multiple of this uses a shorter mask.
pub(crate) const RADIX_BITS: u32 = 8;
pub(crate) const RADIX: u32 = 256;

/// Two equally sized device buffers plus a selector naming the current
/// input. After a completed double-buffer sort the selector names the
/// buffer holding the sorted result.
#[derive(Debug)]
pub struct DoubleBuffer<'a> {
    buffers: [&'a Handle; 2],
    selector: usize,
}

impl<'a> DoubleBuffer<'a> {
    pub fn new(current: &'a Handle, alternate: &'a Handle) -> Self {
        Self {
            buffers: [current, alternate],
            selector: 0,
        }
    }

    pub fn current(&self) -> &'a Handle {
        self.buffers[self.selector]
    }

    pub fn alternate(&self) -> &'a Handle {
        self.buffers[1 - self.selector]
    }

    pub fn selector(&self) -> usize {
        self.selector
    }

    pub fn swap(&mut self) {
        self.selector = 1 - self.selector;
    }
}

fn validate_bit_range<K>(begin_bit: u32, end_bit: u32) -> Result<(), PrimitivesError> {
    let key_bits = (core::mem::size_of::<K>() * 8) as u32;
    if begin_bit >= end_bit || end_bit > key_bits {
        return Err(PrimitivesError::InvalidBitRange {
            begin_bit,
            end_bit,
            key_bits,
        });
    }
    Ok(())
}

/// Starting side of the ping-pong. The pointer-pair API picks the parity
/// that makes the final pass land in the caller's output; the double-buffer
/// API always starts toward the alternate buffer and reports where the
/// result ended up.
fn initial_to_output(iterations: u32, with_double_buffer: bool) -> bool {
    with_double_buffer || (iterations - 1) % 2 == 0
}

/// Sort keys ascending into `keys_output`. Only bits `[begin_bit, end_bit)`
/// participate in the ordering; keys equal on that window keep their
/// relative order. Returns `is_result_in_output`, trivially `true` for the
/// pointer-pair API.
pub fn sort_keys<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    sort_impl::<R, K, u32>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        None,
        None,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`sort_keys`] in descending order.
pub fn sort_keys_descending<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    sort_impl::<R, K, u32>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        None,
        None,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

/// Sort `(key, value)` pairs ascending by key; each value travels with its
/// key through every digit pass.
#[allow(clippy::too_many_arguments)]
pub fn sort_pairs<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values_input: &TensorHandleRef<R>,
    values_output: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    sort_impl::<R, K, V>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        Some((values_input, values_output)),
        None,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`sort_pairs`] in descending key order.
#[allow(clippy::too_many_arguments)]
pub fn sort_pairs_descending<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values_input: &TensorHandleRef<R>,
    values_output: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    sort_impl::<R, K, V>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        Some((values_input, values_output)),
        None,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

/// Sort keys ascending between the two halves of a caller-owned double
/// buffer. On return the selector names the half holding the result; it is
/// swapped only when the result would otherwise sit in the alternate half.
pub fn sort_keys_double_buffer<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    sort_keys_double_buffer_impl::<R, K>(
        client,
        temp_storage,
        keys,
        size,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`sort_keys_double_buffer`] in descending order.
pub fn sort_keys_double_buffer_descending<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    sort_keys_double_buffer_impl::<R, K>(
        client,
        temp_storage,
        keys,
        size,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

#[allow(clippy::too_many_arguments)]
fn sort_keys_double_buffer_impl<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    let key_size = core::mem::size_of::<K>();
    let current = ScratchView::from_parts(keys.current().clone(), size, key_size);
    let alternate = ScratchView::from_parts(keys.alternate().clone(), size, key_size);
    let in_output = sort_impl::<R, K, u32>(
        client,
        temp_storage,
        &current.as_ref::<R>(),
        &alternate.as_ref::<R>(),
        None,
        Some((keys.current(), None)),
        begin_bit,
        end_bit,
        descending,
        debug_synchronous,
    )?;
    if in_output {
        keys.swap();
    }
    Ok(())
}

/// Sort `(key, value)` double buffers ascending by key. Both selectors are
/// swapped together when the result lands in the alternate halves.
#[allow(clippy::too_many_arguments)]
pub fn sort_pairs_double_buffer<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    values: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    sort_pairs_double_buffer_impl::<R, K, V>(
        client,
        temp_storage,
        keys,
        values,
        size,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`sort_pairs_double_buffer`] in descending key order.
#[allow(clippy::too_many_arguments)]
pub fn sort_pairs_double_buffer_descending<
    R: Runtime,
    K: RadixKey + CubeElement,
    V: Numeric + CubeElement,
>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    values: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    sort_pairs_double_buffer_impl::<R, K, V>(
        client,
        temp_storage,
        keys,
        values,
        size,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

#[allow(clippy::too_many_arguments)]
fn sort_pairs_double_buffer_impl<
    R: Runtime,
    K: RadixKey + CubeElement,
    V: Numeric + CubeElement,
>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys: &mut DoubleBuffer<'_>,
    values: &mut DoubleBuffer<'_>,
    size: usize,
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    let key_size = core::mem::size_of::<K>();
    let value_size = core::mem::size_of::<V>();
    let keys_current = ScratchView::from_parts(keys.current().clone(), size, key_size);
    let keys_alternate = ScratchView::from_parts(keys.alternate().clone(), size, key_size);
    let values_current = ScratchView::from_parts(values.current().clone(), size, value_size);
    let values_alternate = ScratchView::from_parts(values.alternate().clone(), size, value_size);
    let in_output = sort_impl::<R, K, V>(
        client,
        temp_storage,
        &keys_current.as_ref::<R>(),
        &keys_alternate.as_ref::<R>(),
        Some((&values_current.as_ref::<R>(), &values_alternate.as_ref::<R>())),
        Some((keys.current(), Some(values.current()))),
        begin_bit,
        end_bit,
        descending,
        debug_synchronous,
    )?;
    if in_output {
        keys.swap();
        values.swap();
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn sort_impl<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values: Option<(&TensorHandleRef<R>, &TensorHandleRef<R>)>,
    caller_tmp: Option<(&Handle, Option<&Handle>)>,
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    validate_bit_range::<K>(begin_bit, end_bit)?;
    ensure_element_supported::<R, K>(client)?;
    ensure_element_supported::<R, K::Radix>(client)?;
    if values.is_some() {
        ensure_element_supported::<R, V>(client)?;
    }
    let size = keys_input.shape.iter().product::<usize>();
    let tile = RADIX_TILE;
    let tiles = tile.tiles(size) as usize;
    let with_values = values.is_some();
    let with_double_buffer = caller_tmp.is_some();
    let iterations = (end_bit - begin_bit).div_ceil(RADIX_BITS);

    let mut layout = TempStorageLayout::new();
    let histograms_slot = layout.reserve(tiles.max(1) * RADIX as usize * 4, 8);
    let keys_tmp_slot = (!with_double_buffer)
        .then(|| layout.reserve(size * core::mem::size_of::<K>(), 8));
    let values_tmp_slot = (with_values && !with_double_buffer)
        .then(|| layout.reserve(size * core::mem::size_of::<V>(), 8));

    let arena = match temp_storage.resolve(&layout)? {
        None => return Ok(true),
        Some(handle) => handle,
    };

    if size == 0 {
        return Ok(true);
    }

    if debug_synchronous {
        log::debug!(
            "radix_sort: size {size}, tiles {tiles}, iterations {iterations}, \
             descending {descending}, double_buffer {with_double_buffer}"
        );
    }

    let histograms = ScratchView::new(arena, histograms_slot, tiles * RADIX as usize, 4);
    let keys_tmp_view = match caller_tmp {
        Some((keys_tmp, _)) => {
            ScratchView::from_parts(keys_tmp.clone(), size, core::mem::size_of::<K>())
        }
        None => ScratchView::new(
            arena,
            keys_tmp_slot.expect("reserved above"),
            size,
            core::mem::size_of::<K>(),
        ),
    };
    let values_tmp_view = match (with_values, caller_tmp) {
        (true, Some((_, Some(values_tmp)))) => {
            ScratchView::from_parts(values_tmp.clone(), size, core::mem::size_of::<V>())
        }
        (true, _) => ScratchView::new(
            arena,
            values_tmp_slot.expect("reserved above"),
            size,
            core::mem::size_of::<V>(),
        ),
        // Never dereferenced; the scatter kernels drop the value path at
        // compile time.
        (false, _) => ScratchView::from_parts(arena.clone(), 1, 4),
    };

    let keys_tmp = keys_tmp_view.as_ref::<R>();
    let values_tmp = values_tmp_view.as_ref::<R>();
    let dummy_values = ScratchView::from_parts(arena.clone(), 1, 4);
    let dummy_values_ref = dummy_values.as_ref::<R>();
    let values_in: &TensorHandleRef<R> = values.map(|v| v.0).unwrap_or(&dummy_values_ref);
    let values_out: &TensorHandleRef<R> = values.map(|v| v.1).unwrap_or(&dummy_values_ref);

    let mut to_output = initial_to_output(iterations, with_double_buffer);
    let mut is_result_in_output = true;
    let mut bit = begin_bit;
    let mut first_pass = true;
    while bit < end_bit {
        let current_bits = RADIX_BITS.min(end_bit - bit);
        let mask = (1u32 << current_bits) - 1;

        let (src_keys, src_values) = if first_pass {
            (keys_input, values_in)
        } else if to_output {
            (&keys_tmp, &values_tmp)
        } else {
            (keys_output, values_out)
        };
        let (dst_keys, dst_values) = if to_output {
            (keys_output, values_out)
        } else {
            (&keys_tmp, &values_tmp)
        };

        let start = Instant::now();
        unsafe {
            radix_histogram_kernel::launch_unchecked::<K, R>(
                client,
                CubeCount::new_1d(tiles as u32),
                tile.cube_dim(),
                src_keys.as_tensor_arg(1),
                histograms.as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(bit),
                ScalarArg::new(mask),
                ScalarArg::new(size as u32),
                descending,
                RADIX,
            );
        }
        sync_if_debug::<R>(client, "radix_histogram_kernel", size, start, debug_synchronous)?;

        let start = Instant::now();
        unsafe {
            radix_offsets_kernel::launch_unchecked::<R>(
                client,
                CubeCount::new_1d(1),
                tile.cube_dim(),
                histograms.as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(tiles as u32),
                RADIX,
                tile.cube_size,
            );
        }
        sync_if_debug::<R>(
            client,
            "radix_offsets_kernel",
            tiles * RADIX as usize,
            start,
            debug_synchronous,
        )?;

        let start = Instant::now();
        unsafe {
            radix_scatter_kernel::launch_unchecked::<K, V, R>(
                client,
                CubeCount::new_1d(tiles as u32),
                tile.cube_dim(),
                src_keys.as_tensor_arg(1),
                dst_keys.as_tensor_arg(1),
                src_values.as_tensor_arg(1),
                dst_values.as_tensor_arg(1),
                histograms.as_ref::<R>().as_tensor_arg(1),
                ScalarArg::new(bit),
                ScalarArg::new(mask),
                ScalarArg::new(size as u32),
                descending,
                with_values,
                RADIX,
                tile.cube_size,
            );
        }
        sync_if_debug::<R>(client, "radix_scatter_kernel", size, start, debug_synchronous)?;

        is_result_in_output = to_output;
        to_output = !to_output;
        bit += RADIX_BITS;
        first_pass = false;
    }

    Ok(is_result_in_output)
}

/// Sort every segment ascending, one cube per segment per digit pass.
/// Segment descriptors are `u32` begin/end offsets; they may share storage
/// shifted by one element. Items outside every segment are not written.
#[allow(clippy::too_many_arguments)]
pub fn segmented_sort_keys<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    begin_offsets: &TensorHandleRef<R>,
    end_offsets: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    segmented_sort_impl::<R, K, u32>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        None,
        begin_offsets,
        end_offsets,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`segmented_sort_keys`] in descending order.
#[allow(clippy::too_many_arguments)]
pub fn segmented_sort_keys_descending<R: Runtime, K: RadixKey + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    begin_offsets: &TensorHandleRef<R>,
    end_offsets: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    segmented_sort_impl::<R, K, u32>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        None,
        begin_offsets,
        end_offsets,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

/// Sort `(key, value)` pairs ascending by key within every segment.
#[allow(clippy::too_many_arguments)]
pub fn segmented_sort_pairs<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values_input: &TensorHandleRef<R>,
    values_output: &TensorHandleRef<R>,
    begin_offsets: &TensorHandleRef<R>,
    end_offsets: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    segmented_sort_impl::<R, K, V>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        Some((values_input, values_output)),
        begin_offsets,
        end_offsets,
        begin_bit,
        end_bit,
        false,
        debug_synchronous,
    )
}

/// [`segmented_sort_pairs`] in descending key order.
#[allow(clippy::too_many_arguments)]
pub fn segmented_sort_pairs_descending<
    R: Runtime,
    K: RadixKey + CubeElement,
    V: Numeric + CubeElement,
>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values_input: &TensorHandleRef<R>,
    values_output: &TensorHandleRef<R>,
    begin_offsets: &TensorHandleRef<R>,
    end_offsets: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    segmented_sort_impl::<R, K, V>(
        client,
        temp_storage,
        keys_input,
        keys_output,
        Some((values_input, values_output)),
        begin_offsets,
        end_offsets,
        begin_bit,
        end_bit,
        true,
        debug_synchronous,
    )
}

#[allow(clippy::too_many_arguments)]
fn segmented_sort_impl<R: Runtime, K: RadixKey + CubeElement, V: Numeric + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    temp_storage: TempStorage<'_>,
    keys_input: &TensorHandleRef<R>,
    keys_output: &TensorHandleRef<R>,
    values: Option<(&TensorHandleRef<R>, &TensorHandleRef<R>)>,
    begin_offsets: &TensorHandleRef<R>,
    end_offsets: &TensorHandleRef<R>,
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
    debug_synchronous: bool,
) -> Result<bool, PrimitivesError> {
    validate_bit_range::<K>(begin_bit, end_bit)?;
    ensure_element_supported::<R, K>(client)?;
    ensure_element_supported::<R, K::Radix>(client)?;
    if values.is_some() {
        ensure_element_supported::<R, V>(client)?;
    }
    let size = keys_input.shape.iter().product::<usize>();
    let segments = begin_offsets.shape.iter().product::<usize>();
    let with_values = values.is_some();
    let iterations = (end_bit - begin_bit).div_ceil(RADIX_BITS);

    let mut layout = TempStorageLayout::new();
    let keys_tmp_slot = layout.reserve(size * core::mem::size_of::<K>(), 8);
    let values_tmp_slot =
        with_values.then(|| layout.reserve(size * core::mem::size_of::<V>(), 8));

    let arena = match temp_storage.resolve(&layout)? {
        None => return Ok(true),
        Some(handle) => handle,
    };

    if size == 0 || segments == 0 {
        return Ok(true);
    }

    if debug_synchronous {
        log::debug!(
            "segmented_radix_sort: size {size}, segments {segments}, iterations {iterations}, \
             descending {descending}"
        );
    }

    let keys_tmp_view = ScratchView::new(arena, keys_tmp_slot, size, core::mem::size_of::<K>());
    let values_tmp_view = match values_tmp_slot {
        Some(slot) => ScratchView::new(arena, slot, size, core::mem::size_of::<V>()),
        None => ScratchView::from_parts(arena.clone(), 1, 4),
    };
    let keys_tmp = keys_tmp_view.as_ref::<R>();
    let values_tmp = values_tmp_view.as_ref::<R>();
    let dummy_values = ScratchView::from_parts(arena.clone(), 1, 4);
    let dummy_values_ref = dummy_values.as_ref::<R>();
    let values_in: &TensorHandleRef<R> = values.map(|v| v.0).unwrap_or(&dummy_values_ref);
    let values_out: &TensorHandleRef<R> = values.map(|v| v.1).unwrap_or(&dummy_values_ref);

    let tile = RADIX_TILE;
    let mut to_output = initial_to_output(iterations, false);
    let mut is_result_in_output = true;
    let mut bit = begin_bit;
    let mut first_pass = true;
    while bit < end_bit {
        let current_bits = RADIX_BITS.min(end_bit - bit);
        let mask = (1u32 << current_bits) - 1;

        let (src_keys, src_values) = if first_pass {
            (keys_input, values_in)
        } else if to_output {
            (&keys_tmp, &values_tmp)
        } else {
            (keys_output, values_out)
        };
        let (dst_keys, dst_values) = if to_output {
            (keys_output, values_out)
        } else {
            (&keys_tmp, &values_tmp)
        };

        let start = Instant::now();
        unsafe {
            segmented_radix_pass_kernel::launch_unchecked::<K, V, R>(
                client,
                CubeCount::new_1d(segments as u32),
                tile.cube_dim(),
                src_keys.as_tensor_arg(1),
                dst_keys.as_tensor_arg(1),
                src_values.as_tensor_arg(1),
                dst_values.as_tensor_arg(1),
                begin_offsets.as_tensor_arg(1),
                end_offsets.as_tensor_arg(1),
                ScalarArg::new(bit),
                ScalarArg::new(mask),
                descending,
                with_values,
                RADIX,
                tile.cube_size,
            );
        }
        sync_if_debug::<R>(
            client,
            "segmented_radix_pass_kernel",
            segments,
            start,
            debug_synchronous,
        )?;

        is_result_in_output = to_output;
        to_output = !to_output;
        bit += RADIX_BITS;
        first_pass = false;
    }

    Ok(is_result_in_output)
}

#[cfg(test)]
mod host_tests {
    use super::*;

    #[test]
    fn bit_range_validation() {
        assert!(validate_bit_range::<u32>(0, 32).is_ok());
        assert!(validate_bit_range::<u32>(7, 8).is_ok());
        assert!(validate_bit_range::<u32>(8, 8).is_err());
        assert!(validate_bit_range::<u32>(0, 33).is_err());
        assert!(validate_bit_range::<u64>(0, 64).is_ok());
        assert!(validate_bit_range::<u16>(0, 17).is_err());
    }

    #[test]
    fn pointer_pair_parity_lands_in_output() {
        // Without a caller double buffer the first hop is chosen so the
        // last pass always writes the output buffer.
        for iterations in 1..10u32 {
            let mut to_output = initial_to_output(iterations, false);
            let mut last = false;
            for _ in 0..iterations {
                last = to_output;
                to_output = !to_output;
            }
            assert!(last, "iterations = {iterations}");
        }
    }

    #[test]
    fn double_buffer_starts_toward_alternate() {
        // With a caller double buffer the result alternates with the pass
        // count: odd counts end in the alternate half.
        for iterations in 1..10u32 {
            let mut to_output = initial_to_output(iterations, true);
            let mut last = false;
            for _ in 0..iterations {
                last = to_output;
                to_output = !to_output;
            }
            assert_eq!(last, iterations % 2 == 1);
        }
    }
}
