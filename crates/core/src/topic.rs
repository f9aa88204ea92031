//! Topic-key derivation and parsing
//!
//! Request topics look like `SERVER/GET/users/`; the paired reply topic is
//! derived by swapping only the leading segment: `CLIENT/GET/users/`. Topic
//! keys are the canonical route identity used for subscription and duplicate
//! detection alike.

use crate::method::Method;

/// Leading segment of request topics.
pub const SERVER_SEGMENT: &str = "SERVER";
/// Leading segment of reply topics.
pub const CLIENT_SEGMENT: &str = "CLIENT";

/// Builds the request topic key for a method and an already-normalized path.
#[must_use]
pub fn request_topic(method: Method, normalized_path: &str) -> String {
    format!("{SERVER_SEGMENT}/{method}{normalized_path}")
}

/// Builds the reply topic for a method and an already-normalized path.
#[must_use]
pub fn reply_topic(method: Method, normalized_path: &str) -> String {
    format!("{CLIENT_SEGMENT}/{method}{normalized_path}")
}

/// Derives the reply topic from a request topic by swapping only the leading
/// segment, leaving method and path intact.
#[must_use]
pub fn reply_topic_for(request_topic: &str) -> String {
    match request_topic.split_once('/') {
        Some((_, rest)) => format!("{CLIENT_SEGMENT}/{rest}"),
        None => format!("{CLIENT_SEGMENT}/"),
    }
}

/// Extracts the method and normalized path from a request topic key.
///
/// Returns `None` for topics that are not `SERVER/{METHOD}{path}` shaped.
#[must_use]
pub fn parse_request_topic(topic: &str) -> Option<(Method, String)> {
    let rest = topic.strip_prefix(SERVER_SEGMENT)?.strip_prefix('/')?;
    let (method, path) = rest.split_once('/')?;
    let method = method.parse().ok()?;
    Some((method, format!("/{path}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_reply_topics() {
        assert_eq!(request_topic(Method::Get, "/users/"), "SERVER/GET/users/");
        assert_eq!(reply_topic(Method::Post, "/x/"), "CLIENT/POST/x/");
    }

    #[test]
    fn test_reply_topic_swaps_leading_segment_only() {
        assert_eq!(reply_topic_for("SERVER/GET/users/"), "CLIENT/GET/users/");
        assert_eq!(
            reply_topic_for("SERVER/POST/api/nested/"),
            "CLIENT/POST/api/nested/"
        );
    }

    #[test]
    fn test_parse_request_topic() {
        let (method, path) = parse_request_topic("SERVER/DELETE/items/42/").unwrap();
        assert_eq!(method, Method::Delete);
        assert_eq!(path, "/items/42/");

        assert!(parse_request_topic("CLIENT/GET/users/").is_none());
        assert!(parse_request_topic("SERVER/HEAD/users/").is_none());
        assert!(parse_request_topic("SERVER").is_none());
    }
}
