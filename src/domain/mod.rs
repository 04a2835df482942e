pub mod filter;
pub mod group;
pub mod identity;

pub use filter::*;
pub use group::*;
pub use identity::*;
