//! Tokenizer for dictionary expressions

use super::EvalError;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    Tilde,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let (token, len) = number(&chars[i..])?;
            tokens.push(token);
            i += len;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "null" | "None" | "undefined" => Token::Null,
                "and" => Token::AndAnd,
                "or" => Token::OrOr,
                "not" => Token::Bang,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, len) = string(&chars[i..], c)?;
            tokens.push(Token::Str(text));
            i += len;
            continue;
        }

        // Longest match first
        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let (token, len) = if rest.starts_with("===") {
            (Token::EqEq, 3)
        } else if rest.starts_with("!==") {
            (Token::NotEq, 3)
        } else if rest.starts_with("**") {
            (Token::StarStar, 2)
        } else if rest.starts_with("<=") {
            (Token::Le, 2)
        } else if rest.starts_with(">=") {
            (Token::Ge, 2)
        } else if rest.starts_with("==") {
            (Token::EqEq, 2)
        } else if rest.starts_with("!=") {
            (Token::NotEq, 2)
        } else if rest.starts_with("&&") {
            (Token::AndAnd, 2)
        } else if rest.starts_with("||") {
            (Token::OrOr, 2)
        } else if rest.starts_with("<<") {
            (Token::Shl, 2)
        } else if rest.starts_with(">>") {
            (Token::Shr, 2)
        } else {
            let single = match c {
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                '.' => Token::Dot,
                '?' => Token::Question,
                ':' => Token::Colon,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '!' => Token::Bang,
                '~' => Token::Tilde,
                '<' => Token::Lt,
                '>' => Token::Gt,
                '&' => Token::Amp,
                '|' => Token::Pipe,
                '^' => Token::Caret,
                '≤' => Token::Le,
                '≥' => Token::Ge,
                '≠' => Token::NotEq,
                other => return Err(EvalError::UnexpectedChar(other, i)),
            };
            (single, 1)
        };
        tokens.push(token);
        i += len;
    }

    Ok(tokens)
}

fn number(chars: &[char]) -> Result<(Token, usize), EvalError> {
    if chars.len() > 2 && chars[0] == '0' && matches!(chars[1], 'x' | 'X') {
        let len = 2 + chars[2..].iter().take_while(|c| c.is_ascii_hexdigit()).count();
        let digits: String = chars[2..len].iter().collect();
        let value = i64::from_str_radix(&digits, 16)
            .map(Value::Int)
            .or_else(|_| u64::from_str_radix(&digits, 16).map(Value::UInt))
            .map_err(|_| EvalError::InvalidNumber(format!("0x{digits}")))?;
        return Ok((Token::Number(value), len));
    }

    let mut len = chars.iter().take_while(|c| c.is_ascii_digit()).count();
    let mut float = false;
    if chars.get(len) == Some(&'.') {
        float = true;
        len += 1;
        len += chars[len..].iter().take_while(|c| c.is_ascii_digit()).count();
    }
    if matches!(chars.get(len), Some('e' | 'E')) {
        let mut exp = len + 1;
        if matches!(chars.get(exp), Some('+' | '-')) {
            exp += 1;
        }
        let digits = chars[exp.min(chars.len())..].iter().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            float = true;
            len = exp + digits;
        }
    }

    let text: String = chars[..len].iter().collect();
    let value = if float {
        text.parse::<f64>().map(Value::Float).ok()
    } else {
        text.parse::<i64>()
            .map(Value::Int)
            .ok()
            .or_else(|| text.parse::<f64>().map(Value::Float).ok())
    };
    value.map(|v| (Token::Number(v), len)).ok_or(EvalError::InvalidNumber(text))
}

fn string(chars: &[char], quote: char) -> Result<(String, usize), EvalError> {
    let mut out = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1).ok_or(EvalError::UnterminatedString)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(EvalError::UnterminatedString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_keep_integer_and_float_forms() {
        assert_eq!(
            tokenize("12 1.5 .25 0x1F 3e2").unwrap(),
            vec![
                Token::Number(Value::Int(12)),
                Token::Number(Value::Float(1.5)),
                Token::Number(Value::Float(0.25)),
                Token::Number(Value::Int(31)),
                Token::Number(Value::Float(300.0)),
            ]
        );
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            tokenize("a<=b === c ** 2").unwrap(),
            vec![
                Token::Ident("a".into()),
                Token::Le,
                Token::Ident("b".into()),
                Token::EqEq,
                Token::Ident("c".into()),
                Token::StarStar,
                Token::Number(Value::Int(2)),
            ]
        );
    }

    #[test]
    fn unicode_comparisons_are_sanitized() {
        assert_eq!(tokenize("5 ≤ x").unwrap()[1], Token::Le);
        assert_eq!(tokenize("5 ≥ x").unwrap()[1], Token::Ge);
    }

    #[test]
    fn strings_and_errors() {
        assert_eq!(tokenize(r#"'O\'N'"#).unwrap(), vec![Token::Str("O'N".into())]);
        assert_eq!(tokenize("'open"), Err(EvalError::UnterminatedString));
        assert!(matches!(tokenize("a # b"), Err(EvalError::UnexpectedChar('#', 2))));
    }
}
