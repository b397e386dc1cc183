use std::ops::Range;

/// Locates the first complete brace-balanced frame in `buffer`.
///
/// Returns the byte range of the frame; `range.end` is also the number of
/// leading bytes the caller may discard. Text before the frame (SSE `data:`
/// prefixes, blank lines, `[DONE]` markers) is skipped. Braces inside JSON
/// strings are not structural, and a backslash inside a string always
/// consumes the following byte.
///
/// `None` means more input is needed; the caller keeps the whole buffer.
pub fn extract_frame(buffer: &[u8]) -> Option<Range<usize>> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0usize;
    let mut index = 0usize;

    while index < buffer.len() {
        let byte = buffer[index];

        if in_string {
            match byte {
                b'\\' => index += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match byte {
                b'{' => {
                    if depth == 0 {
                        start = index;
                    }
                    depth += 1;
                }
                b'}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(start..index + 1);
                    }
                }
                // Quotes only open strings inside a frame; prose before a
                // frame may contain unbalanced quotes.
                b'"' if depth > 0 => in_string = true,
                _ => {}
            }
        }

        index += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::extract_frame;

    fn frame(input: &str) -> Option<&str> {
        extract_frame(input.as_bytes()).map(|range| &input[range])
    }

    #[test]
    fn no_frame_in_empty_or_open_input() {
        assert_eq!(frame(""), None);
        assert_eq!(frame("data: "), None);
        assert_eq!(frame("{\"a\": {\"b\": 1}"), None);
    }

    #[test]
    fn bare_and_prefixed_frames() {
        assert_eq!(frame("{}"), Some("{}"));
        assert_eq!(frame(" {}"), Some("{}"));
        assert_eq!(frame("foo: {}"), Some("{}"));
        assert_eq!(frame(" foo: {}  bar "), Some("{}"));
    }

    #[test]
    fn braces_inside_strings_are_not_structural() {
        assert_eq!(
            frame(" foo: {\"a\": \"b: {\"}  bar "),
            Some("{\"a\": \"b: {\"}")
        );
        assert_eq!(
            frame(" foo: {\"a\": \"b: }\"}  bar "),
            Some("{\"a\": \"b: }\"}")
        );
        assert_eq!(frame(" x: {\"a\":\"b: {\"} y "), Some("{\"a\":\"b: {\"}"));
    }

    #[test]
    fn escaped_quotes_do_not_close_strings() {
        let input = r#"data: {"content":"say \"}\" twice \\"} tail"#;
        assert_eq!(frame(input), Some(r#"{"content":"say \"}\" twice \\"}"#));
    }

    #[test]
    fn only_the_first_frame_is_returned() {
        let input = "data: {\"n\":1}\n\ndata: {\"n\":2}\n\n";
        let range = extract_frame(input.as_bytes()).expect("first frame");
        assert_eq!(&input[range.clone()], "{\"n\":1}");
        assert_eq!(frame(&input[range.end..]), Some("{\"n\":2}"));
    }

    #[test]
    fn stray_closing_brace_before_frame_is_ignored() {
        assert_eq!(frame("} {\"ok\":true}"), Some("{\"ok\":true}"));
    }

    #[test]
    fn consumed_end_covers_leading_text() {
        let input = "data: [DONE]\n\ndata: {\"x\":{}}rest";
        let range = extract_frame(input.as_bytes()).expect("frame");
        assert_eq!(&input[range.end..], "rest");
    }
}
