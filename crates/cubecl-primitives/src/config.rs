use std::time::Instant;

use cubecl_core::prelude::*;
use cubecl_core::Feature;

use crate::PrimitivesError;

/// Geometry of one tile, the slice of input a single cube owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileConfig {
    pub cube_size: u32,
    pub items_per_unit: u32,
}

impl TileConfig {
    pub const fn new(cube_size: u32, items_per_unit: u32) -> Self {
        Self {
            cube_size,
            items_per_unit,
        }
    }

    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.cube_size)
    }

    pub const fn items_per_tile(&self) -> u32 {
        self.cube_size * self.items_per_unit
    }

    /// Number of tiles covering `size` items.
    pub fn tiles(&self, size: usize) -> u32 {
        size.div_ceil(self.items_per_tile() as usize) as u32
    }
}

pub(crate) const SCAN_TILE: TileConfig = TileConfig::new(256, 4);
pub(crate) const PARTITION_TILE: TileConfig = TileConfig::new(256, 4);
pub(crate) const REDUCE_BY_KEY_TILE: TileConfig = TileConfig::new(256, 4);
pub(crate) const RADIX_TILE: TileConfig = TileConfig::new(256, 1);

/// Smallest plane width across the supported runtimes, used to size the
/// shared memory of plane-cooperative scans at compile time.
pub(crate) const MIN_PLANE_DIM: u32 = 32;

/// Fail early when the client cannot express the element type at all; the
/// engines have no fallback for a type the compiler cannot emit.
pub(crate) fn ensure_element_supported<R: Runtime, E: CubePrimitive>(
    client: &ComputeClient<R::Server, R::Channel>,
) -> Result<(), PrimitivesError> {
    let elem = E::as_elem_native_unchecked();
    if !client.properties().feature_enabled(Feature::Type(elem)) {
        return Err(PrimitivesError::UnsupportedElement(elem));
    }
    Ok(())
}

/// In debug-synchronous mode, wait for the stream after a kernel launch and
/// log one diagnostic line: operation name, size, elapsed wall time.
pub(crate) fn sync_if_debug<R: Runtime>(
    client: &ComputeClient<R::Server, R::Channel>,
    kernel: &str,
    size: usize,
    start: Instant,
    debug_synchronous: bool,
) -> Result<(), PrimitivesError> {
    if !debug_synchronous {
        return Ok(());
    }
    cubecl_common::future::block_on(client.sync());
    log::debug!(
        "{kernel}({size}) {:.3} ms",
        start.elapsed().as_secs_f64() * 1e3
    );
    Ok(())
}
