//! The back-end of the compiler.

pub mod frame;
pub mod lower;
pub mod ra;
pub mod x86;

pub use frame::{emit_function, EmitOptions, FrameLayout, FrameMode};
pub use lower::lower_function;
pub use ra::allocate_registers;

#[cfg(test)]
mod tests;
