mod base;
mod max;
mod min;
mod prod;
mod sum;

pub use base::*;
pub use max::Max;
pub use min::Min;
pub use prod::Prod;
pub use sum::Sum;
