pub mod balance;
pub mod order;
pub mod user;
pub mod withdrawal;

pub use balance::*;
pub use order::*;
pub use user::*;
pub use withdrawal::*;
