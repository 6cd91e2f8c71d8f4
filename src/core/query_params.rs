use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use murmur::core::query_params::parse_query_params;
/// let params = parse_query_params("/path?user=john&page=2");
/// assert_eq!(params.get("user"), Some(&"john".to_string()));
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(query_start) => parse_pairs(&uri[query_start + 1..]),
        None => HashMap::new(),
    }
}

/// Parse an `application/x-www-form-urlencoded` request body.
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    parse_pairs(&String::from_utf8_lossy(body))
}

fn parse_pairs(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match param.find('=') {
            Some(eq_idx) => (&param[..eq_idx], &param[eq_idx + 1..]),
            // Flag parameter without value
            None => (param, ""),
        };
        params.insert(decode(key), decode(value));
    }

    params
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params.get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

/// Get an integer parameter; missing or non-numeric values fall back to `default`.
pub fn get_int(params: &HashMap<String, String>, key: &str, default: i64) -> i64 {
    params.get(key)
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_form_encoding() {
        let form = parse_form(b"username=ann+lee&about_me=caf%C3%A9%20au+lait&flag");
        assert_eq!(form["username"], "ann lee");
        assert_eq!(form["about_me"], "café au lait");
        assert_eq!(form["flag"], "");
    }

    #[test]
    fn integers_fall_back_on_garbage() {
        let params = parse_query_params("/users?page=abc&per_page=-3");
        assert_eq!(get_int(&params, "page", 1), 1);
        assert_eq!(get_int(&params, "per_page", 10), -3);
        assert_eq!(get_int(&params, "missing", 7), 7);
    }

    #[test]
    fn no_query_string_means_no_params() {
        assert!(parse_query_params("/explore").is_empty());
        assert_eq!(get_string(&HashMap::new(), "next", Some("/index")).as_deref(), Some("/index"));
    }
}
