//! Phone-identifier normalization and one-way hashing.
//!
//! Inbound channel identifiers arrive in many equivalent spellings of the
//! same number ("+40 721 000 111", "0040721000111", "0721000111"). Identity
//! resolution works over the full variant set so every spelling lands on the
//! same guest, and only sha256 digests of the variants are ever persisted.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

/// Prefix mixed into opaque channel-user hashes so a platform user token can
/// never collide with a digits-only phone hash.
const CHANNEL_USER_HASH_PREFIX: &str = "chan:";

/// Returns the set of equivalent digits-only variants for a raw phone-like
/// identifier.
///
/// Rules: strip non-digits, drop a leading international "00", keep the bare
/// digits, add the form without a single leading "0" plus its
/// `country_code`-prefixed spelling, and for numbers carrying `country_code`
/// add the local form with a leading "0".
pub fn phone_variants(raw: &str, country_code: &str) -> BTreeSet<String> {
    let mut variants = BTreeSet::new();
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return variants;
    }
    if let Some(stripped) = digits.strip_prefix("00") {
        digits = stripped.to_string();
    }
    if digits.is_empty() {
        return variants;
    }
    variants.insert(digits.clone());
    if digits.len() > 1 {
        if let Some(national) = digits.strip_prefix('0') {
            variants.insert(national.to_string());
            if !country_code.is_empty() {
                variants.insert(format!("{country_code}{national}"));
            }
        }
    }
    if !country_code.is_empty() && digits.len() > country_code.len() {
        if let Some(local) = digits.strip_prefix(country_code) {
            variants.insert(format!("0{local}"));
        }
    }
    variants.retain(|variant| !variant.is_empty());
    variants
}

/// Returns the canonical form of a phone-like identifier: the longest
/// variant, which is usually the full international number.
pub fn canonical_phone(raw: &str, country_code: &str) -> Option<String> {
    phone_variants(raw, country_code)
        .into_iter()
        .max_by_key(|variant| (variant.len(), variant.clone()))
}

/// Hashes an identifier for storage and lookup. Plaintext identifiers are
/// never written to the identity table.
pub fn hash_identifier(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Hashes every variant of a raw identifier for lookup.
pub fn variant_hashes(raw: &str, country_code: &str) -> Vec<String> {
    phone_variants(raw, country_code)
        .iter()
        .map(|variant| hash_identifier(variant))
        .collect()
}

/// Hashes an opaque channel user id into the placeholder-guest keyspace.
pub fn channel_user_hash(channel_user_id: &str) -> String {
    hash_identifier(&format!("{CHANNEL_USER_HASH_PREFIX}{channel_user_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_phone_variants_cover_prefix_spellings() {
        let variants = phone_variants("+40 721 000 111", "40");
        assert!(variants.contains("40721000111"));
        assert!(variants.contains("0721000111"));

        let with_idd = phone_variants("0040721000111", "40");
        assert_eq!(variants, with_idd);

        let local = phone_variants("0721000111", "40");
        assert!(local.contains("0721000111"));
        assert!(local.contains("721000111"));
        assert!(local.contains("40721000111"));
    }

    #[test]
    fn unit_canonical_phone_prefers_international_form() {
        assert_eq!(
            canonical_phone("+40 721 000 111", "40").as_deref(),
            Some("40721000111")
        );
        assert_eq!(canonical_phone("no digits here", "40"), None);
    }

    #[test]
    fn unit_every_variant_spelling_hashes_into_shared_set() {
        // Any spelling of the same number must intersect the hash set of any
        // other spelling, otherwise resolution would split one guest in two.
        let canonical_hash = hash_identifier("40721000111");
        for raw in ["+40721000111", "0040721000111", "40721000111", "0721000111"] {
            assert!(
                variant_hashes(raw, "40").contains(&canonical_hash),
                "variant set for {raw} misses the canonical hash"
            );
        }
    }

    #[test]
    fn unit_channel_user_hash_never_collides_with_phone_hash() {
        assert_ne!(channel_user_hash("40721000111"), hash_identifier("40721000111"));
    }

    #[test]
    fn unit_variants_reject_empty_and_zero_only_input() {
        assert!(phone_variants("", "40").is_empty());
        assert!(phone_variants("abc", "40").is_empty());
        assert!(!phone_variants("0", "40").is_empty());
    }
}
