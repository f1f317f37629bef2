//! Shared leaf utilities for Stayline components.
//!
//! Hosts phone-identifier normalization/hashing and the outbound transport
//! seam. Everything here is dependency-light so every other crate can pull it
//! in without cycles.

pub mod phone;
pub mod transport;

pub use phone::{
    canonical_phone, channel_user_hash, hash_identifier, phone_variants, variant_hashes,
};
pub use transport::{NullOutboundSender, OutboundSender};
