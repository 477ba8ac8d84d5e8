use cubecl_core as cubecl;
use cubecl_core::prelude::*;
use half::{bf16, f16};

/// Unsigned bit pattern of a radix key. `digit` extracts a window of bits;
/// `flip` complements the pattern, which reverses the sort order for
/// descending variants.
#[cube]
pub trait RadixBits: CubePrimitive + Numeric {
    const BITS: u32;

    fn digit(this: &Self, shift: u32, mask: u32) -> u32;

    fn flip(this: &Self) -> Self;
}

#[cube]
impl RadixBits for u32 {
    const BITS: u32 = 32;

    fn digit(this: &Self, shift: u32, mask: u32) -> u32 {
        this >> shift & mask
    }

    fn flip(this: &Self) -> Self {
        BitwiseNot::bitwise_not(*this)
    }
}

#[cube]
impl RadixBits for u64 {
    const BITS: u32 = 64;

    fn digit(this: &Self, shift: u32, mask: u32) -> u32 {
        u32::cast_from(*this >> u64::cast_from(shift)) & mask
    }

    fn flip(this: &Self) -> Self {
        BitwiseNot::bitwise_not(*this)
    }
}

/// A fixed-width arithmetic key the radix engines can sort: maps to an
/// order-preserving unsigned bit pattern. Signed integers flip the sign
/// bit; floats flip the sign bit of non-negative values and every bit of
/// negative ones, which totally orders IEEE values. Narrow keys widen into
/// the low bits of a `u32`.
#[cube]
pub trait RadixKey: Numeric {
    type Radix: RadixBits;

    fn to_radix(this: &Self) -> Self::Radix;
}

#[cube]
impl RadixKey for u32 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        *this
    }
}

#[cube]
impl RadixKey for i32 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        u32::reinterpret(*this) ^ 0x80_00_00_00u32
    }
}

#[cube]
impl RadixKey for f32 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        let bits = u32::reinterpret(*this);
        if (bits & 0x80_00_00_00u32) != 0 {
            BitwiseNot::bitwise_not(bits)
        } else {
            bits | 0x80_00_00_00u32
        }
    }
}

#[cube]
impl RadixKey for u64 {
    type Radix = u64;

    fn to_radix(this: &Self) -> u64 {
        *this
    }
}

#[cube]
impl RadixKey for i64 {
    type Radix = u64;

    fn to_radix(this: &Self) -> u64 {
        u64::reinterpret(*this) ^ 0x80_00_00_00_00_00_00_00u64
    }
}

#[cube]
impl RadixKey for f64 {
    type Radix = u64;

    fn to_radix(this: &Self) -> u64 {
        let bits = u64::reinterpret(*this);
        if (bits & 0x80_00_00_00_00_00_00_00u64) != 0 {
            BitwiseNot::bitwise_not(bits)
        } else {
            bits | 0x80_00_00_00_00_00_00_00u64
        }
    }
}

#[cube]
impl RadixKey for u16 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        u32::cast_from(*this)
    }
}

#[cube]
impl RadixKey for i16 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        u32::cast_from(u16::reinterpret(*this)) ^ 0x80_00u32
    }
}

#[cube]
impl RadixKey for f16 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        let bits = u32::cast_from(u16::reinterpret(*this));
        if (bits & 0x80_00u32) != 0 {
            BitwiseNot::bitwise_not(bits) & 0xFF_FFu32
        } else {
            bits | 0x80_00u32
        }
    }
}

#[cube]
impl RadixKey for bf16 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        let bits = u32::cast_from(u16::reinterpret(*this));
        if (bits & 0x80_00u32) != 0 {
            BitwiseNot::bitwise_not(bits) & 0xFF_FFu32
        } else {
            bits | 0x80_00u32
        }
    }
}

#[cube]
impl RadixKey for u8 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        u32::cast_from(*this)
    }
}

#[cube]
impl RadixKey for i8 {
    type Radix = u32;

    fn to_radix(this: &Self) -> u32 {
        u32::cast_from(u8::reinterpret(*this)) ^ 0x80u32
    }
}
