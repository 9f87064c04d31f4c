pub mod base;
pub mod fetch;
pub mod logging;

pub use base::*;
pub use fetch::*;
pub use logging::*;
