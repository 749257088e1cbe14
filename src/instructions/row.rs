//! Field splitting for instruction source rows.
//!
//! Rows are comma separated with optional double-quoted fields (JSON
//! arguments embed commas), `""` escaping a literal quote. Small enough to
//! walk by hand rather than pull in a full CSV reader.

/// Splits one row into its fields. Returns `None` on an unterminated
/// quoted field.
pub fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
        } else {
            match ch {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' if field.is_empty() => in_quotes = true,
                other => field.push(other),
            }
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields() {
        assert_eq!(
            split_fields("0.5,PHONEME,AI,200").unwrap(),
            vec!["0.5", "PHONEME", "AI", "200"]
        );
    }

    #[test]
    fn quoted_field_with_commas() {
        let fields = split_fields(r#"0.0,POSITION,"{""0"": 1500, ""1"": 1460}",300"#).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[2], r#"{"0": 1500, "1": 1460}"#);
    }

    #[test]
    fn trailing_empty_field() {
        assert_eq!(
            split_fields("1.0,STOP,\"[0, 1]\",").unwrap(),
            vec!["1.0", "STOP", "[0, 1]", ""]
        );
    }

    #[test]
    fn unterminated_quote_rejected() {
        assert!(split_fields("0.0,POSITION,\"{").is_none());
    }
}
