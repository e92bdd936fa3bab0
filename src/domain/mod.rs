pub mod auction;
pub mod bid;
pub mod state;

pub use auction::*;
pub use bid::*;
pub use state::*;
