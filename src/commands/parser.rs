//! Tokenizing and typed argument decoding for command lines
//!
//! Tokens are separated by spaces or tabs. A token starting with `"` runs to
//! the next unescaped `"`; inside it `\"` and `\\` are the only escapes.

use super::CommandError;

/// Declared type of one command parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    UInt,
    Int,
    Float,
}

/// Decoded argument value
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Str(String),
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Argument {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Argument::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Argument::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Argument::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Split a command line into tokens
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| is_separator(*c)).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        if first == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    None => return Err(CommandError::UnterminatedString),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped @ ('"' | '\\')) => token.push(escaped),
                        Some(other) => {
                            token.push('\\');
                            token.push(other);
                        }
                        None => return Err(CommandError::UnterminatedString),
                    },
                    Some(c) => token.push(c),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(c) = chars.next_if(|c| !is_separator(*c)) {
                token.push(c);
            }
            tokens.push(token);
        }
    }

    Ok(tokens)
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Decode one token according to its declared type
pub fn decode_argument(token: &str, kind: ArgType) -> Result<Argument, CommandError> {
    let invalid = || CommandError::InvalidArgument {
        token: token.to_string(),
        expected: kind,
    };
    match kind {
        ArgType::Str => Ok(Argument::Str(token.to_string())),
        ArgType::UInt => token.parse::<u64>().map(Argument::UInt).map_err(|_| invalid()),
        ArgType::Int => token.parse::<i64>().map(Argument::Int).map_err(|_| invalid()),
        ArgType::Float => token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Argument::Float)
            .ok_or_else(invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain_words() {
        assert_eq!(
            tokenize("helloadd  2\t3 ").unwrap(),
            vec!["helloadd", "2", "3"]
        );
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_quoted_string() {
        assert_eq!(
            tokenize(r#"helloecho "two words" x"#).unwrap(),
            vec!["helloecho", "two words", "x"]
        );
    }

    #[test]
    fn test_tokenize_escapes() {
        assert_eq!(
            tokenize(r#"helloecho "say \"hi\" \\ \n""#).unwrap(),
            vec!["helloecho", r#"say "hi" \ \n"#]
        );
    }

    #[test]
    fn test_tokenize_unterminated() {
        assert_eq!(
            tokenize(r#"helloecho "oops"#),
            Err(CommandError::UnterminatedString)
        );
        assert_eq!(
            tokenize(r#"helloecho "oops\"#),
            Err(CommandError::UnterminatedString)
        );
    }

    #[test]
    fn test_decode_unsigned() {
        assert_eq!(decode_argument("42", ArgType::UInt), Ok(Argument::UInt(42)));
        assert!(decode_argument("-1", ArgType::UInt).is_err());
        assert!(decode_argument("4x", ArgType::UInt).is_err());
        assert!(decode_argument("18446744073709551616", ArgType::UInt).is_err());
    }

    #[test]
    fn test_decode_signed() {
        assert_eq!(decode_argument("-17", ArgType::Int), Ok(Argument::Int(-17)));
        assert_eq!(decode_argument("+5", ArgType::Int), Ok(Argument::Int(5)));
        assert!(decode_argument("1.5", ArgType::Int).is_err());
    }

    #[test]
    fn test_decode_float() {
        assert_eq!(
            decode_argument("2.5", ArgType::Float),
            Ok(Argument::Float(2.5))
        );
        assert_eq!(
            decode_argument("-3", ArgType::Float),
            Ok(Argument::Float(-3.0))
        );
        assert!(decode_argument("nan", ArgType::Float).is_err());
        assert!(decode_argument("inf", ArgType::Float).is_err());
    }

    #[test]
    fn test_decode_string_is_verbatim() {
        assert_eq!(
            decode_argument("anything-123", ArgType::Str),
            Ok(Argument::Str("anything-123".to_string()))
        );
    }

    #[test]
    fn test_argument_accessors() {
        assert_eq!(Argument::UInt(3).as_u64(), Some(3));
        assert_eq!(Argument::UInt(3).as_i64(), None);
        assert_eq!(Argument::Str("x".into()).as_str(), Some("x"));
        assert_eq!(Argument::Float(1.0).as_f64(), Some(1.0));
    }
}
