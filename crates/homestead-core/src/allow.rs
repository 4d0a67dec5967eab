//! Allow-list enforcement shared by the channel drivers and the outbox.
//!
//! Deny-by-default: an empty list means no one is allowed. Wildcard `"*"`
//! allows everyone. Entries may match a username (with or without a leading
//! `@`) or a numeric chat/user id.

/// Returns `true` when `username`/`id` is permitted per `allow_users`.
///
/// Matching rules (case-sensitive):
/// - `"*"` — allow everyone
/// - `"@name"` or `"name"` — match by username, without the `@`
/// - `"123"` — match by numeric id
///
/// An empty `allow_users` slice always returns `false`.
pub fn is_allowed(allow_users: &[String], username: &str, id: &str) -> bool {
    if allow_users.is_empty() {
        return false;
    }
    allow_users.iter().any(|entry| {
        let entry = entry.trim_start_matches('@');
        entry == "*" || entry == username || entry == id
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_denies_all() {
        assert!(!is_allowed(&[], "alice", "100"));
    }

    #[test]
    fn wildcard_allows_all() {
        let list = vec!["*".to_string()];
        assert!(is_allowed(&list, "alice", "100"));
        assert!(is_allowed(&list, "", "999"));
    }

    #[test]
    fn match_by_chat_id() {
        let list = vec!["100".to_string()];
        assert!(is_allowed(&list, "", "100"));
        assert!(!is_allowed(&list, "", "200"));
    }

    #[test]
    fn match_by_username_with_and_without_at() {
        let list = vec!["@alice".to_string()];
        assert!(is_allowed(&list, "alice", "1"));
        let list2 = vec!["alice".to_string()];
        assert!(is_allowed(&list2, "alice", "1"));
    }
}
