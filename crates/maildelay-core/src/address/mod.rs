//! Delay-encoded addresses.
//!
//! Users schedule a message by sending it to an address whose local-part
//! encodes the delay, e.g. `2w.k4x9q2m7ab@example.org` for two weeks.

mod codec;
mod units;

pub use codec::{AddressCodec, DelaySpec, Recipient};
pub use units::DelayUnitTable;
