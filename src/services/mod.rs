pub mod push;
pub mod router;

pub use push::{Delivery, Outbound, PushHandle, PushRegistry};
pub use router::{pick_best, QuoteRouter};
