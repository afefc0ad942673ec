pub mod forecast;
pub mod quote;

pub use forecast::*;
pub use quote::*;
