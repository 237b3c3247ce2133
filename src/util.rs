use crate::error::Error;
use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;

/// Apply `"Name: Value"` lines onto a header map, appending in order.
pub fn put_header_lines<'a, I: IntoIterator<Item = &'a String>>(
    header_map: &mut HeaderMap<HeaderValue>,
    lines: I,
) -> Result<(), Error> {
    for line in lines {
        let (name, value) = split_header_line(line);
        let header_name = HeaderName::from_lowercase(name.to_lowercase().as_bytes())?;
        let header_value = HeaderValue::from_str(value)?;
        header_map.append(header_name, header_value);
    }
    Ok(())
}

/// Split one `"Name: Value"` line; a missing separator yields an empty value.
pub fn split_header_line(line: &str) -> (&str, &str) {
    match line.find(':') {
        Some(colon) => (&line[..colon], line[colon + 1..].trim_start()),
        None => (line, ""),
    }
}

/// The path-and-query portion of a URL; already-relative input is returned
/// as-is.
pub fn origin_form(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let after_authority = &url[scheme_end + 3..];
            match after_authority.find('/') {
                Some(slash) => &after_authority[slash..],
                None => "/",
            }
        }
        None => url,
    }
}

/// Whether a content type carries text that can be persisted verbatim;
/// everything else is treated as binary and base64-encoded in the script.
pub fn is_text(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    media_type.starts_with("text/")
        || media_type == "application/json"
        || media_type == "application/xml"
        || media_type == "application/xhtml+xml"
        || media_type == "application/x-www-form-urlencoded"
        || media_type.ends_with("+json")
        || media_type.ends_with("+xml")
        || media_type.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_strips_scheme_and_authority() {
        assert_eq!(origin_form("http://localhost:9000/api/v1/items?x=1"), "/api/v1/items?x=1");
        assert_eq!(origin_form("https://api.example.com"), "/");
        assert_eq!(origin_form("/already/relative?q=2"), "/already/relative?q=2");
    }

    #[test]
    fn put_header_lines_appends_repeated_names_in_order() {
        let lines = vec![
            "accept: application/json".to_string(),
            "x-two: first".to_string(),
            "x-two: second".to_string(),
        ];

        let mut header_map = HeaderMap::new();
        put_header_lines(&mut header_map, &lines).unwrap();

        assert_eq!(header_map.len(), 3);
        let two: Vec<&str> = header_map
            .get_all("x-two")
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(two, vec!["first", "second"]);
    }

    #[test]
    fn mixed_case_header_names_are_accepted() {
        let lines = vec!["Content-Type: text/plain".to_string()];
        let mut header_map = HeaderMap::new();
        put_header_lines(&mut header_map, &lines).unwrap();

        assert_eq!(header_map.get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn split_header_line_tolerates_a_missing_separator() {
        assert_eq!(split_header_line("name: value"), ("name", "value"));
        assert_eq!(split_header_line("odd line"), ("odd line", ""));
    }

    #[test]
    fn text_content_types_are_recognised() {
        assert!(is_text("text/plain"));
        assert!(is_text("text/html; charset=utf-8"));
        assert!(is_text("application/json"));
        assert!(is_text("application/hal+json"));
        assert!(is_text(""));
        assert!(!is_text("application/octet-stream"));
        assert!(!is_text("image/png"));
    }
}
