pub mod auctions;
pub mod system;

pub use auctions::*;
pub use system::*;
