use core::fmt;

use cubecl_core::ir::Elem;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PrimitivesError {
    /// The radix bit window is outside `0 <= begin_bit < end_bit <= bits(Key)`.
    InvalidBitRange {
        begin_bit: u32,
        end_bit: u32,
        key_bits: u32,
    },
    /// The element type is not expressible on this client.
    UnsupportedElement(Elem),
    /// The caller passed a scratch buffer smaller than the sentinel a size
    /// query reports, i.e. one that can only come from skipping the query.
    /// Detected in debug builds only.
    ZeroSizedScratch,
    /// A kernel wait requested by debug-synchronous mode reported a failure.
    Execution(String),
}

impl fmt::Display for PrimitivesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBitRange {
                begin_bit,
                end_bit,
                key_bits,
            } => write!(
                f,
                "Invalid radix bit range [{begin_bit}, {end_bit}) for a key of {key_bits} bits."
            ),
            Self::UnsupportedElement(elem) => {
                write!(f, "Element type {elem} is not supported by the client.")
            }
            Self::ZeroSizedScratch => {
                write!(
                    f,
                    "Temporary storage is smaller than any size a query reports; \
                     query the required size with TempStorage::SizeQuery first."
                )
            }
            Self::Execution(msg) => write!(f, "Kernel execution failed: {msg}"),
        }
    }
}

impl std::error::Error for PrimitivesError {}
