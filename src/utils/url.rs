/// Joins a configured API base URL and an endpoint path with exactly one
/// slash between them.
///
/// ```
/// use repolens::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url(" https://api.openai.com/v1/ ", "/chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let endpoint = endpoint.trim().trim_start_matches('/');
    format!("{base}/{endpoint}")
}
