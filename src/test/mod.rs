
pub use factories::*;
