mod bank_info;
mod earning;
mod eth;
mod money;
mod payout;
mod session;
mod subscription;
mod tier;
mod user;

pub use bank_info::*;
pub use earning::*;
pub use eth::*;
pub use money::*;
pub use payout::*;
pub use session::*;
pub use subscription::*;
pub use tier::*;
pub use user::*;
