#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    text: &'a str,
    max_word_length: u8,
}

fuzz_target!(|input: Input| {
    let max_word_length = input.max_word_length as usize + 1;
    let field = memindex::utils::tokenize(input.text, max_word_length);
    let mut last = None;
    for token in &field.tokens {
        assert!(!token.text.is_empty());
        assert!(token.text.len() <= max_word_length);
        assert!(token.position < field.field_length);
        assert!(last.is_none_or(|p| p < token.position));
        last = Some(token.position);
    }
});
