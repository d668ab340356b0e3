use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::Star => "*",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    Integer(i64),
    Decimal(f64),
    String(String),
    Symbol(Symbol),
    End,
}

/// One token. Identifiers keep their original spelling in `text`; the
/// upper-cased shadow in `upper` is what keyword matching runs against.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub upper: String,
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        let text = text.into();
        let upper = text.to_ascii_uppercase();
        Self {
            kind,
            text,
            upper,
            offset,
        }
    }
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.upper == keyword
    }
    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }
}

/// Hand-written lexer. An unterminated string collapses the whole input
/// to an empty token stream, which the parser rejects.
pub fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = vec![];
    let mut pos = 0usize;
    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        if ch == b'\'' {
            let mut content = vec![];
            pos += 1;
            let mut closed = false;
            while pos < bytes.len() {
                if bytes[pos] == b'\'' {
                    // doubled quote is an escaped quote
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'\'' {
                        content.push(b'\'');
                        pos += 2;
                        continue;
                    }
                    pos += 1;
                    closed = true;
                    break;
                }
                content.push(bytes[pos]);
                pos += 1;
            }
            if !closed {
                return vec![];
            }
            let value = String::from_utf8_lossy(&content).to_string();
            tokens.push(Token::new(
                TokenKind::String(value.clone()),
                value,
                start,
            ));
            continue;
        }
        if ch.is_ascii_digit() || (ch == b'-' && pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_digit())
        {
            pos += 1;
            let mut is_decimal = false;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_digit() || (bytes[pos] == b'.' && !is_decimal))
            {
                if bytes[pos] == b'.' {
                    is_decimal = true;
                }
                pos += 1;
            }
            let text = &input[start..pos];
            let kind = if is_decimal {
                match text.parse::<f64>() {
                    Ok(value) => TokenKind::Decimal(value),
                    Err(_) => return vec![],
                }
            } else {
                match text.parse::<i64>() {
                    Ok(value) => TokenKind::Integer(value),
                    Err(_) => return vec![],
                }
            };
            tokens.push(Token::new(kind, text, start));
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == b'_' {
            pos += 1;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push(Token::new(TokenKind::Identifier, &input[start..pos], start));
            continue;
        }
        let symbol = match ch {
            b'(' => Some(Symbol::LParen),
            b')' => Some(Symbol::RParen),
            b',' => Some(Symbol::Comma),
            b';' => Some(Symbol::Semicolon),
            b'.' => Some(Symbol::Dot),
            b'*' => Some(Symbol::Star),
            b'=' => Some(Symbol::Eq),
            b'<' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b'=' {
                    pos += 1;
                    Some(Symbol::LtEq)
                } else if pos + 1 < bytes.len() && bytes[pos + 1] == b'>' {
                    pos += 1;
                    Some(Symbol::NotEq)
                } else {
                    Some(Symbol::Lt)
                }
            }
            b'>' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b'=' {
                    pos += 1;
                    Some(Symbol::GtEq)
                } else {
                    Some(Symbol::Gt)
                }
            }
            b'!' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b'=' {
                    pos += 1;
                    Some(Symbol::NotEq)
                } else {
                    None
                }
            }
            _ => None,
        };
        match symbol {
            Some(symbol) => {
                pos += 1;
                tokens.push(Token::new(
                    TokenKind::Symbol(symbol),
                    &input[start..pos],
                    start,
                ));
            }
            None => return vec![],
        }
    }
    tokens.push(Token::new(TokenKind::End, "", input.len()));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_identifiers() {
        let tokens = tokenize("SELECT name FROM Users");
        assert_eq!(tokens.len(), 5);
        assert!(tokens[0].is_keyword("SELECT"));
        assert_eq!(tokens[1].text, "name");
        assert!(tokens[2].is_keyword("FROM"));
        // case preserved, shadow upper-cased
        assert_eq!(tokens[3].text, "Users");
        assert_eq!(tokens[3].upper, "USERS");
        assert_eq!(tokens[4].kind, TokenKind::End);
    }

    #[test]
    fn numbers_and_strings() {
        let tokens = tokenize("42 -17 3.5 'it''s'");
        assert_eq!(tokens[0].kind, TokenKind::Integer(42));
        assert_eq!(tokens[1].kind, TokenKind::Integer(-17));
        assert_eq!(tokens[2].kind, TokenKind::Decimal(3.5));
        assert_eq!(tokens[3].kind, TokenKind::String("it's".to_string()));
    }

    #[test]
    fn two_char_symbols() {
        let tokens = tokenize("<= >= != <> < >");
        let symbols = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Symbol(s) => Some(s),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            symbols,
            vec![
                Symbol::LtEq,
                Symbol::GtEq,
                Symbol::NotEq,
                Symbol::NotEq,
                Symbol::Lt,
                Symbol::Gt
            ]
        );
    }

    #[test]
    fn byte_offsets() {
        let tokens = tokenize("ab  cd");
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 4);
        assert_eq!(tokens[2].offset, 6);
    }

    #[test]
    fn unterminated_string_empties_stream() {
        assert!(tokenize("SELECT 'oops").is_empty());
    }
}
