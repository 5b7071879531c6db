/// A word occurrence in a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Lowercased word text
    pub text: String,
    /// Index of the word among all words of the field
    pub position: u32,
}

/// Result of tokenizing one field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedField {
    pub tokens: Vec<Token>,
    /// Number of words in the field, including dropped overlong ones
    pub field_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharType {
    Word,
    Other,
}

fn classify_char(ch: char) -> CharType {
    if ch.is_alphanumeric() {
        CharType::Word
    } else {
        CharType::Other
    }
}

/// Split `content` into lowercase alphanumeric runs with their positions.
///
/// Words longer than `max_word_length` bytes (after lowercasing) still take
/// a position but produce no token; they are usually hashes or encoded data.
pub fn tokenize(content: &str, max_word_length: usize) -> TokenizedField {
    let mut field = TokenizedField::default();
    let mut current = String::new();

    for ch in content.chars() {
        match classify_char(ch) {
            CharType::Word => current.extend(ch.to_lowercase()),
            CharType::Other => {
                if !current.is_empty() {
                    push_token(&mut field, &mut current, max_word_length);
                }
            }
        }
    }

    if !current.is_empty() {
        push_token(&mut field, &mut current, max_word_length);
    }

    field
}

fn push_token(field: &mut TokenizedField, current: &mut String, max_word_length: usize) {
    let position = field.field_length;
    field.field_length += 1;
    if current.len() <= max_word_length {
        field.tokens.push(Token {
            text: std::mem::take(current),
            position,
        });
    } else {
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(field: &TokenizedField) -> Vec<&str> {
        field.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_positions() {
        let field = tokenize("The quick, brown fox!", 255);
        assert_eq!(texts(&field), vec!["the", "quick", "brown", "fox"]);
        let positions: Vec<u32> = field.tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert_eq!(field.field_length, 4);
    }

    #[test]
    fn test_overlong_words_keep_their_position() {
        let field = tokenize("a bbbbbbbbbb c", 4);
        assert_eq!(texts(&field), vec!["a", "c"]);
        assert_eq!(field.tokens[1].position, 2);
        assert_eq!(field.field_length, 3);
    }

    #[test]
    fn test_unicode_and_digits() {
        let field = tokenize("Ärger_42 über", 255);
        assert_eq!(texts(&field), vec!["ärger", "42", "über"]);
    }

    #[test]
    fn test_empty_input() {
        let field = tokenize("  ,;  ", 255);
        assert!(field.tokens.is_empty());
        assert_eq!(field.field_length, 0);
    }
}
