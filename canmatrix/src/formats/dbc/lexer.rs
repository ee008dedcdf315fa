//! DBC statement splitting and tokenizing
//!
//! Works on raw bytes: nothing is decoded here, so identifiers and comments
//! can be decoded with different codecs by the parser.

/// One token of a DBC statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Maximal run of non-whitespace, non-punctuation bytes
    Word(&'a [u8]),
    /// Quoted string with `\"` and `\\` unescaped
    Str(Vec<u8>),
    /// One of `: | @ ( ) [ ] , ;`
    Punct(u8),
}

impl Token<'_> {
    pub fn is_punct(&self, p: u8) -> bool {
        matches!(self, Token::Punct(c) if *c == p)
    }
}

/// A statement with the line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement<'a> {
    /// 1-based line number
    pub line: usize,
    /// True if the first line started with whitespace
    pub indented: bool,
    /// Statement bytes, trimmed; continuation lines are joined with `\n`
    pub text: std::borrow::Cow<'a, [u8]>,
}

const PUNCT: &[u8] = b":|@()[],;";

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !is_space(*first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !is_space(*last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Whether a quoted string is still open at the end of `bytes`
fn ends_inside_string(bytes: &[u8], mut open: bool) -> bool {
    let mut escaped = false;
    for &b in bytes {
        if escaped {
            escaped = false;
        } else if open && b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            open = !open;
        }
    }
    open
}

/// Split a DBC byte stream into statements
///
/// Each non-empty physical line is a statement, except that a line ending
/// inside a quoted string continues on the following lines. `//` lines are
/// dropped.
pub(crate) fn split_statements(data: &[u8]) -> Vec<Statement<'_>> {
    let mut statements = Vec::new();
    let mut lines = data
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .enumerate();

    while let Some((idx, line)) = lines.next() {
        let text = trim(line);
        if text.is_empty() || text.starts_with(b"//") {
            continue;
        }
        let indented = line.first().map_or(false, |&b| is_space(b));

        if !ends_inside_string(text, false) {
            statements.push(Statement {
                line: idx + 1,
                indented,
                text: text.into(),
            });
            continue;
        }

        let mut joined = text.to_vec();
        for (_, next) in lines.by_ref() {
            joined.push(b'\n');
            joined.extend_from_slice(next);
            if !ends_inside_string(next, true) {
                break;
            }
        }
        let trimmed_len = trim(&joined).len();
        joined.truncate(trimmed_len);
        statements.push(Statement {
            line: idx + 1,
            indented,
            text: joined.into(),
        });
    }

    statements
}

/// Tokenize one statement
pub(crate) fn tokenize(text: &[u8]) -> Result<Vec<Token<'_>>, String> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let b = text[pos];
        if is_space(b) {
            pos += 1;
        } else if b == b'"' {
            let (value, next) = read_string(text, pos + 1)?;
            tokens.push(Token::Str(value));
            pos = next;
        } else if PUNCT.contains(&b) {
            tokens.push(Token::Punct(b));
            pos += 1;
        } else {
            let start = pos;
            while pos < text.len()
                && !is_space(text[pos])
                && !PUNCT.contains(&text[pos])
                && text[pos] != b'"'
            {
                pos += 1;
            }
            tokens.push(Token::Word(&text[start..pos]));
        }
    }

    Ok(tokens)
}

/// Read a quoted string body starting after the opening quote
fn read_string(text: &[u8], mut pos: usize) -> Result<(Vec<u8>, usize), String> {
    let mut value = Vec::new();
    while pos < text.len() {
        match text[pos] {
            b'"' => return Ok((value, pos + 1)),
            b'\\' if matches!(text.get(pos + 1), Some(b'"') | Some(b'\\')) => {
                value.push(text[pos + 1]);
                pos += 2;
            }
            other => {
                value.push(other);
                pos += 1;
            }
        }
    }
    Err("unterminated string".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(data: &[u8]) -> Vec<(usize, String)> {
        split_statements(data)
            .into_iter()
            .map(|s| (s.line, String::from_utf8_lossy(&s.text).into_owned()))
            .collect()
    }

    #[test]
    fn test_split_lines() {
        let data = b"VERSION \"\"\r\n\r\nBO_ 1 A: 8 X\n SG_ S : 0|8@1+ (1,0) [0|0] \"\" Y\n// note\n";
        assert_eq!(
            texts(data),
            vec![
                (1, "VERSION \"\"".to_string()),
                (3, "BO_ 1 A: 8 X".to_string()),
                (4, "SG_ S : 0|8@1+ (1,0) [0|0] \"\" Y".to_string()),
            ]
        );
        let statements = split_statements(data);
        assert!(!statements[1].indented);
        assert!(statements[2].indented);
    }

    #[test]
    fn test_multi_line_comment() {
        let data = b"CM_ SG_ 1 S \"first\nsecond \\\" still\nthird\";\nBU_: A\n";
        assert_eq!(
            texts(data),
            vec![
                (1, "CM_ SG_ 1 S \"first\nsecond \\\" still\nthird\";".to_string()),
                (4, "BU_: A".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_signal() {
        let tokens = tokenize(b"SG_ Speed m1M : 7|16@0- (0.1,-40) [0|0] \"km/h\" A,B").unwrap();
        assert_eq!(tokens[0], Token::Word(b"SG_"));
        assert_eq!(tokens[2], Token::Word(b"m1M"));
        assert_eq!(tokens[3], Token::Punct(b':'));
        assert_eq!(tokens[7], Token::Punct(b'@'));
        assert_eq!(tokens[8], Token::Word(b"0-"));
        assert_eq!(tokens[12], Token::Word(b"-40"));
        assert_eq!(tokens[19], Token::Str(b"km/h".to_vec()));
        assert_eq!(tokens[20], Token::Word(b"A"));
        assert!(tokens[21].is_punct(b','));
        assert_eq!(tokens.len(), 23);
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize(br#"CM_ "say \"hi\" C:\path";"#).unwrap();
        assert_eq!(tokens[1], Token::Str(br#"say "hi" C:\path"#.to_vec()));
        assert!(tokens[2].is_punct(b';'));

        assert!(tokenize(b"CM_ \"open").is_err());
    }

    #[test]
    fn test_tokenize_raw_bytes() {
        // latin-1 bytes pass through untouched
        let tokens = tokenize(b"BU_: Steuerger\xe4t").unwrap();
        assert_eq!(tokens[2], Token::Word(b"Steuerger\xe4t"));
    }
}
