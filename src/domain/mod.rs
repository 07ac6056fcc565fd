pub mod frame;
pub mod order;
pub mod quote;

pub use frame::*;
pub use order::*;
pub use quote::*;
