//! Decodes `\uXXXX` escape sequences embedddded in upstream error text so
//! stored errors and downstream CSVs show native characters instead of
//! escape codes.

/// Decodes Unicode escapes in `input`. Tries the whole string as a quoted
/// JSON string first (cheapest path for a fully-escaped message); falls
/// back to decoding individual `\uXXXX` runs when that fails, replacing any
/// run that still doesn't decode with `?` rather than looping forever.
pub fn decode_unicode_escapes(input: &str) -> String {
    if let Ok(whole) = serde_json::from_str::<String>(&format!("\"{input}\"")) {
        return whole;
    }

    let mut result = input.to_string();
    loop {
        let Some(start) = result.find("\\u") else {
            break;
        };
        if start + 6 > result.len() {
            break;
        }
        let escape = &result[start..start + 6];
        let decoded = escape
            .get(2..6)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32)
            .map(|c| c.to_string());

        let replacement = decoded.unwrap_or_else(|| "?".to_string());
        result.replace_range(start..start + 6, &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_fully_escaped_message() {
        assert_eq!(decode_unicode_escapes("\\u897f\\u73ed\\u7259\\u7ad9"), "西班牙站");
    }

    #[test]
    fn leaves_plain_ascii_untouched() {
        assert_eq!(decode_unicode_escapes("call failed: timeout"), "call failed: timeout");
    }

    #[test]
    fn replaces_unparsable_escape_with_question_mark() {
        assert_eq!(decode_unicode_escapes("bad\\uZZZZtail"), "bad?tail");
    }
}
