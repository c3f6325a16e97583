//! `Authorization: Bearer <token>` parsing.

const SCHEME: &str = "Bearer ";

/// Extract the token from a bearer header value.
///
/// Absent, malformed and empty values all yield `None`; they are not errors.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.trim_start().strip_prefix(SCHEME)?.trim();
    (!token.is_empty()).then_some(token)
}
