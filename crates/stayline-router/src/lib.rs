//! Conversation routing for inbound channel webhooks.
//!
//! Verification and decoding live in [`ingress`], the room-link grammar in
//! [`room_code`], short-lived link confirmations in [`pending_link`], and
//! the routing engine itself in [`router`].

pub mod ingress;
pub mod pending_link;
pub mod room_code;
pub mod router;

pub use ingress::{parse_inbound, verify_sha256_hmac_signature, InboundMessage};
pub use pending_link::PendingLinkCache;
pub use room_code::{is_bare_room_number, parse_room_link_code, RoomLinkCode};
pub use router::{route_inbound, InboundEnvelope, RouteOutcome, RouterContext};
