mod impls;
mod ledger;
mod payout;
mod requests;
mod responses;
mod util;

pub use self::ledger::*;
pub use impls::*;
pub use payout::*;
pub use requests::*;
pub use responses::*;
pub use util::*;
