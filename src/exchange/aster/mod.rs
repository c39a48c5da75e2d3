//! Aster perpetuals.

mod adapter;
pub mod state;
pub mod types;

pub use adapter::AsterAdapter;
