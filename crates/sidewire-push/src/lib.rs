//! Push notification routing for sidewire.
//!
//! The service sends unsolicited frames (sequence 0) tagged with a
//! category. The protocol layer already turned that category into a
//! [`PushKind`]; this crate keeps, per kind, the ordered list of
//! subscribers and hands each notification to every one of them.
//!
//! # Delivery rules
//!
//! - A notification goes only to subscribers of its own kind. Unknown
//!   categories arrive as [`PushKind::Generic`], so new push types reach
//!   generic subscribers instead of being lost.
//! - Subscribers are called in the order they subscribed.
//! - Delivery is fire-and-forget: a callback that fails (or panics) is
//!   logged and the remaining subscribers still run.

mod dispatcher;

pub use dispatcher::{
    DispatchReport, HandlerError, PushDispatcher, PushHandler, SubscriptionId,
};
pub use sidewire_protocol::{PushKind, PushNotification};
