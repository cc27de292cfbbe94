//! Tokenizer for the condition/filter/key-condition/projection/update
//! expression language described in §4.E. Identifier-aware, placeholder
//! aware (`#name`, `:val`), and quote/number aware. Unknown characters are
//! an error; everything recognized is either structural (operators,
//! punctuation, keywords) or an atom the parser treats opaquely
//! (identifiers, literals, placeholders).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Name(String),  // #name, without the leading '#'
    Value(String), // :val, without the leading ':'
    Ident(String), // bare identifier, possibly a function name
    Str(String),
    Num(String),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Set,
    Remove,
    Add,
    Delete,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("'{0}' placeholder must be followed by an identifier at offset {1}")]
    EmptyPlaceholder(char, usize),
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, TokenizeError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'>') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '#' => {
                let start = i;
                i += 1;
                let name = take_ident_chars(&chars, &mut i);
                if name.is_empty() {
                    return Err(TokenizeError::EmptyPlaceholder('#', start));
                }
                tokens.push(Token::Name(name));
            }
            ':' => {
                let start = i;
                i += 1;
                let name = take_ident_chars(&chars, &mut i);
                if name.is_empty() {
                    return Err(TokenizeError::EmptyPlaceholder(':', start));
                }
                tokens.push(Token::Value(name));
            }
            '\'' | '"' => {
                let quote = c;
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(TokenizeError::UnterminatedString(start)),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') if chars.get(i + 1) == Some(&quote) => {
                            s.push(quote);
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|n| n.is_ascii_digit() || *n == '.' || *n == '-' || *n == '+' || *n == 'e' || *n == 'E')
                {
                    i += 1;
                }
                tokens.push(Token::Num(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let ident = take_ident_chars(&chars, &mut i);
                debug_assert!(!ident.is_empty());
                let _ = start;
                tokens.push(keyword_or_ident(&ident));
            }
            other => return Err(TokenizeError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

fn take_ident_chars(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while chars.get(*i).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn keyword_or_ident(ident: &str) -> Token {
    match ident.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "SET" => Token::Set,
        "REMOVE" => Token::Remove,
        "ADD" => Token::Add,
        "DELETE" => Token::Delete,
        _ => Token::Ident(ident.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_simple_condition() {
        let tokens = tokenize("attribute_exists(#f) AND #n <> :v").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("attribute_exists".into()),
                Token::LParen,
                Token::Name("f".into()),
                Token::RParen,
                Token::And,
                Token::Name("n".into()),
                Token::Ne,
                Token::Value("v".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_list_and_map_access() {
        let tokens = tokenize("a.b[0].c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::LBracket,
                Token::Num("0".into()),
                Token::RBracket,
                Token::Dot,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_quoted_string_with_escaped_quote() {
        let tokens = tokenize("contains(#n, 'it''s')").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("contains".into()),
                Token::LParen,
                Token::Name("n".into()),
                Token::Comma,
                Token::Str("it's".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn rejects_empty_placeholder() {
        assert!(tokenize("#").is_err());
        assert!(tokenize(": ").is_err());
    }
}
