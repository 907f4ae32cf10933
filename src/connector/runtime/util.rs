use crate::connector::constants::ERROR_BODY_SNIPPET_LIMIT;

pub(crate) fn join_path(base: &str, fragment: &str) -> String {
    let base = base.trim_end_matches('/');
    let fragment = fragment.trim_start_matches('/');
    if fragment.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{fragment}")
    }
}

/// Later writes replace earlier headers with the same (case-insensitive) name.
pub(crate) fn merge_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
    {
        Some(entry) => *entry = (name.to_string(), value.to_string()),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

pub(crate) fn body_snippet(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    let limit = body.len().min(ERROR_BODY_SNIPPET_LIMIT);
    let mut snippet = String::from_utf8_lossy(&body[..limit]).into_owned();
    if body.len() > limit {
        snippet.push_str("...");
    }
    Some(snippet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_normalises_slashes() {
        assert_eq!(
            join_path("https://a.example.com/api/", "/v1/models"),
            "https://a.example.com/api/v1/models"
        );
        assert_eq!(
            join_path("https://a.example.com/api", "v1"),
            "https://a.example.com/api/v1"
        );
        assert_eq!(
            join_path("https://a.example.com/api/", ""),
            "https://a.example.com/api"
        );
    }

    #[test]
    fn merge_header_replaces_case_insensitively() {
        let mut headers = vec![("Accept".to_string(), "text/plain".to_string())];
        merge_header(&mut headers, "accept", "application/json");
        merge_header(&mut headers, "X-Trace", "1");
        assert_eq!(
            headers,
            vec![
                ("accept".to_string(), "application/json".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn body_snippet_truncates_long_bodies() {
        assert_eq!(body_snippet(b""), None);
        assert_eq!(body_snippet(b"oops").as_deref(), Some("oops"));

        let long = vec![b'x'; ERROR_BODY_SNIPPET_LIMIT + 10];
        let snippet = body_snippet(&long).expect("snippet");
        assert_eq!(snippet.len(), ERROR_BODY_SNIPPET_LIMIT + 3);
        assert!(snippet.ends_with("..."));
    }
}
