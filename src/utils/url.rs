//! URL helpers shared by the chat backend and store clients.
//!
//! Base URLs come from user settings and config files, so trailing slashes are
//! common; every endpoint is built through [`construct_api_url`] to avoid
//! doubled separators.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use ollamacode::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:5000/"), "http://localhost:5000");
/// assert_eq!(normalize_base_url("http://localhost:5000///"), "http://localhost:5000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// ```
/// use ollamacode::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:5000/", "/chat"),
///     "http://localhost:5000/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
