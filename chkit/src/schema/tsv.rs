// chkit/src/schema/tsv.rs
//
// TabSeparated text codec: escaping, line splitting and array literals.
//

use crate::errors::{ClickHouseError, Result};

/// Backslash-escape the characters that would break a TSV field or a quoted
/// literal.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out
}

/// Escaped and wrapped in single quotes, as used for string literals.
pub fn quote(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Reverse of [`escape`]. Unknown escape sequences yield the escaped
/// character itself, a trailing lone backslash is kept.
pub fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split one TSV line into its raw (still escaped) fields.
pub fn split_tsv(line: &str) -> Vec<&str> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split('\t').collect()
}

/// Split one TSV line and unescape every field.
pub fn parse_tsv(line: &str) -> Vec<String> {
    split_tsv(line).into_iter().map(unescape).collect()
}

/// Parse an array literal such as `['a', 'b']`, `[1,2,3]` or `[[1],[2,3]]`
/// into its top-level items. Quoted items come back unquoted and unescaped;
/// unquoted items (numbers, nested arrays) come back verbatim.
pub fn parse_array(literal: &str) -> Result<Vec<String>> {
    let literal = literal.trim();
    let inner = literal
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ClickHouseError::ParseError(format!("invalid array literal: {:?}", literal)))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(' ')) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };

        if first == '\'' {
            chars.next();
            let mut raw = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        raw.push(c);
                        if let Some(escaped) = chars.next() {
                            raw.push(escaped);
                        }
                    }
                    '\'' => {
                        closed = true;
                        break;
                    }
                    _ => raw.push(c),
                }
            }
            if !closed {
                return Err(ClickHouseError::ParseError(format!(
                    "missing closing quote in array literal: {:?}",
                    literal
                )));
            }
            items.push(unescape(&raw));
        } else {
            let mut raw = String::new();
            let mut depth = 0usize;
            let mut in_quote = false;
            while let Some(&c) = chars.peek() {
                if !in_quote && depth == 0 && c == ',' {
                    break;
                }
                chars.next();
                raw.push(c);
                match c {
                    '\\' if in_quote => {
                        if let Some(escaped) = chars.next() {
                            raw.push(escaped);
                        }
                    }
                    '\'' => in_quote = !in_quote,
                    '[' if !in_quote => depth += 1,
                    ']' if !in_quote => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            items.push(raw.trim_end().to_string());
        }

        while matches!(chars.peek(), Some(' ')) {
            chars.next();
        }
        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(other) => {
                return Err(ClickHouseError::ParseError(format!(
                    "unexpected {:?} in array literal: {:?}",
                    other, literal
                )))
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_special_chars() {
        assert_eq!(escape("a\tb\nc"), "a\\tb\\nc");
        assert_eq!(escape("it's \\ here"), "it\\'s \\\\ here");
        assert_eq!(quote("x'y"), "'x\\'y'");
        let nasty = "special chars: ,\"\\'` \n\t\\[]\0";
        assert_eq!(unescape(&escape(nasty)), nasty);
    }

    #[test]
    fn test_unescape_unknown_and_trailing() {
        assert_eq!(unescape("a\\qb"), "aqb");
        assert_eq!(unescape("end\\"), "end\\");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn test_parse_tsv_line() {
        assert_eq!(
            parse_tsv("1\thello\\tworld\t2016-08-30\n"),
            vec!["1", "hello\tworld", "2016-08-30"]
        );
        assert_eq!(split_tsv("a\t\tb"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_parse_array_items() {
        assert_eq!(parse_array("[]").unwrap(), Vec::<String>::new());
        assert_eq!(parse_array("[1,2,3]").unwrap(), vec!["1", "2", "3"]);
        assert_eq!(
            parse_array("['hello', 'world']").unwrap(),
            vec!["hello", "world"]
        );
        assert_eq!(
            parse_array("['goodbye,','it\\'s','a\\tb']").unwrap(),
            vec!["goodbye,", "it's", "a\tb"]
        );
        assert_eq!(parse_array("[[1,2],[3]]").unwrap(), vec!["[1,2]", "[3]"]);
        assert_eq!(parse_array("[['a,b'],[]]").unwrap(), vec!["['a,b']", "[]"]);
    }

    #[test]
    fn test_parse_array_errors() {
        assert!(parse_array("1,2").is_err());
        assert!(parse_array("['open").is_err());
        assert!(parse_array("['a' 'b']").is_err());
    }
}
