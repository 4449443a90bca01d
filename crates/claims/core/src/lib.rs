//! Claims signature and validation primitives shared by the sdkit crates.
mod signature;
pub use signature::*;

mod verification;
pub use verification::*;

mod numeric_date;
pub use numeric_date::*;
