/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Extracts the raw bytes of the file part whose form field is `field_name`.
///
/// Only parts carrying a `filename` parameter count as files, so a plain text
/// field with the same name is ignored. Parts are split on `CRLF--boundary`,
/// so a payload containing `--boundary` mid-line stays intact.
pub fn extract_file_field(body: &[u8], boundary: &str, field_name: &str) -> Option<Vec<u8>> {
    let delimiter = format!("\r\n--{}", boundary);
    // The first delimiter has no preceding CRLF.
    let mut framed = Vec::with_capacity(body.len() + 2);
    framed.extend_from_slice(b"\r\n");
    framed.extend_from_slice(body);

    for part in split_on(&framed, delimiter.as_bytes()).into_iter().skip(1) {
        let sep = b"\r\n\r\n";
        if let Some(sep_pos) = find_subsequence(part, sep) {
            let headers = String::from_utf8_lossy(&part[..sep_pos]);
            let is_field = disposition_param(&headers, "name").as_deref() == Some(field_name);
            if is_field && disposition_param(&headers, "filename").is_some() {
                return Some(part[sep_pos + sep.len()..].to_vec());
            }
        }
    }
    None
}

/// Returns the value of `key="..."` from a part's header block, matching the
/// parameter name exactly (`name` does not match `filename`).
fn disposition_param(headers: &str, key: &str) -> Option<String> {
    headers
        .split(|c| c == ';' || c == '\n')
        .map(|s| s.trim())
        .find_map(|param| {
            let (k, v) = param.split_once('=')?;
            k.trim().eq_ignore_ascii_case(key).then(|| v.trim().trim_matches('"').to_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, data) in parts {
            out.extend(format!("--{}\r\n", boundary).as_bytes());
            let disposition = match filename {
                Some(f) => format!("form-data; name=\"{}\"; filename=\"{}\"", name, f),
                None => format!("form-data; name=\"{}\"", name),
            };
            out.extend(format!("Content-Disposition: {}\r\n", disposition).as_bytes());
            out.extend(b"Content-Type: application/octet-stream\r\n\r\n");
            out.extend_from_slice(data);
            out.extend(b"\r\n");
        }
        out.extend(format!("--{}--\r\n", boundary).as_bytes());
        out
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(extract_boundary("multipart/form-data; boundary=abc").as_deref(), Some("abc"));
        assert_eq!(extract_boundary("multipart/form-data; boundary=\"q r\"").as_deref(), Some("q r"));
        assert_eq!(extract_boundary("multipart/form-data"), None);
        assert_eq!(extract_boundary("multipart/form-data; boundary="), None);
    }

    #[test]
    fn named_file_part_is_extracted_verbatim() {
        let payload = b"\x89PNG\r\n\x1a\n\x00\x01binary\r\n";
        let b = body("XyZ", &[("note", None, &b"hello"[..]), ("image", Some("digit.png"), &payload[..])]);
        assert_eq!(extract_file_field(&b, "XyZ", "image").unwrap(), payload.to_vec());
    }

    #[test]
    fn boundary_text_inside_payload_is_not_a_delimiter() {
        let payload = b"abc--XyZdef\r\n";
        let b = body("XyZ", &[("image", Some("digit.png"), &payload[..])]);
        assert_eq!(extract_file_field(&b, "XyZ", "image").unwrap(), payload.to_vec());
    }

    #[test]
    fn text_field_or_other_file_does_not_match() {
        let b = body("XyZ", &[("image", None, &b"not a file"[..]), ("upload", Some("image"), &b"data"[..])]);
        assert_eq!(extract_file_field(&b, "XyZ", "image"), None);
    }

    #[test]
    fn split_on_keeps_empty_pieces() {
        assert_eq!(split_on(b"a--b--", b"--"), vec![&b"a"[..], &b"b"[..], &b""[..]]);
    }
}
