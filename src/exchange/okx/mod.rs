//! OKX USDT-margined perpetual swaps.

mod adapter;
pub mod state;
pub mod types;

pub use adapter::OkxAdapter;
