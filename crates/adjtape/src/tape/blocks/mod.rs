//! Reference block kinds.
//!
//! Each block records one elementary operation and implements the four
//! propagation rules for it.

mod add;
mod assign;
mod mul;
mod split;

pub use add::AddBlock;
pub use assign::AssignBlock;
pub use mul::MulBlock;
pub use split::{MergeBlock, SplitBlock};
