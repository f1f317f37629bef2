//! Room-link code grammar.
//!
//! Printed room codes expand to a text of the form
//! `connect room <label> #<tenant_id> !<token>`; the tenant marker and
//! token are optional for properties that never enabled the registry.
//! Guests on phone-identified channels may also type a bare room number.

/// A parsed room-link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLinkCode {
    pub room_label: String,
    pub tenant_id: Option<i64>,
    pub token: Option<String>,
}

/// Parses the `connect room ...` grammar, case-insensitively.
pub fn parse_room_link_code(text: &str) -> Option<RoomLinkCode> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let rest = lowered.strip_prefix("connect room")?;
    // Re-slice the original text so the room label keeps its casing.
    let rest = trimmed[trimmed.len() - rest.len()..].trim();
    if rest.is_empty() {
        return None;
    }
    let mut room_label = None;
    let mut tenant_id = None;
    let mut token = None;
    for word in rest.split_whitespace() {
        if let Some(marker) = word.strip_prefix('#') {
            tenant_id = marker.parse::<i64>().ok();
        } else if let Some(marker) = word.strip_prefix('!') {
            if !marker.is_empty() {
                token = Some(marker.to_ascii_lowercase());
            }
        } else if room_label.is_none() {
            room_label = Some(word.to_string());
        }
    }
    Some(RoomLinkCode {
        room_label: room_label?,
        tenant_id,
        token,
    })
}

/// A short all-digit message is treated as a room number on channels where
/// the sender is already identified by phone.
pub fn is_bare_room_number(text: &str) -> bool {
    let trimmed = text.trim();
    (1..=5).contains(&trimmed.len()) && trimmed.bytes().all(|byte| byte.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_full_code_with_tenant_and_token() {
        let code = parse_room_link_code("Connect Room 101 #7 !A1B2C3").expect("code");
        assert_eq!(code.room_label, "101");
        assert_eq!(code.tenant_id, Some(7));
        assert_eq!(code.token.as_deref(), Some("a1b2c3"));
    }

    #[test]
    fn unit_parse_minimal_code() {
        let code = parse_room_link_code("connect room 204b").expect("code");
        assert_eq!(code.room_label, "204b");
        assert_eq!(code.tenant_id, None);
        assert_eq!(code.token, None);
    }

    #[test]
    fn unit_parse_rejects_non_codes() {
        assert_eq!(parse_room_link_code("hello there"), None);
        assert_eq!(parse_room_link_code("connect room"), None);
        assert_eq!(parse_room_link_code("connect room #7"), None);
    }

    #[test]
    fn unit_bare_room_number_bounds() {
        assert!(is_bare_room_number("101"));
        assert!(is_bare_room_number(" 7 "));
        assert!(!is_bare_room_number("404040"));
        assert!(!is_bare_room_number("10a"));
        assert!(!is_bare_room_number(""));
    }
}
