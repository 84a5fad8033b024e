use std::time::Duration;

/// Marker prepended to every encrypted message body in the remote store.
pub const ENCRYPTED_PREFIX: &str = "encrypted_";
/// Namespace prefix for every cache key written to the local KV substrate.
pub const CACHE_PREFIX: &str = "cache_";
/// Content shown in place of a message that could not be decrypted.
pub const DECRYPTION_FAILED_PLACEHOLDER: &str = "[This message could not be decrypted]";
/// Cache lifetime for a full-session read.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(5 * 60);
/// Cache lifetime for a single page of a session.
pub const DEFAULT_PAGE_TTL: Duration = Duration::from_secs(2 * 60);
/// Largest page a paginated read may request.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Default number of messages returned by a recent-messages read.
pub const DEFAULT_RECENT_LIMIT: u32 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ttl_is_shorter_than_session_ttl() {
        assert!(DEFAULT_PAGE_TTL < DEFAULT_SESSION_TTL);
        assert!(!DEFAULT_PAGE_TTL.is_zero());
    }

    #[test]
    fn prefixes_are_distinct() {
        assert_ne!(ENCRYPTED_PREFIX, CACHE_PREFIX);
        assert!(!DECRYPTION_FAILED_PLACEHOLDER.starts_with(ENCRYPTED_PREFIX));
    }

    #[test]
    fn page_limits_are_positive() {
        assert!(MAX_PAGE_SIZE > 0);
        assert!(DEFAULT_RECENT_LIMIT > 0);
        assert!(DEFAULT_RECENT_LIMIT <= MAX_PAGE_SIZE);
    }
}
