//! Utility functions shared by the stores and the inverter.
//!
//! ## Modules
//!
//! - [`encoding`] - Variable-length integer, zigzag and delta encoding
//! - [`tokenizer`] - Positional word extraction
//!
//! ## Key Functions
//!
//! ```
//! use memindex::utils::{decode_varint, encode_varint, tokenize};
//!
//! let mut buf = Vec::new();
//! encode_varint(300, &mut buf);
//! assert_eq!(decode_varint(&buf), Some((300, 2)));
//!
//! let field = tokenize("Hello, world", 255);
//! assert_eq!(field.tokens[1].text, "world");
//! ```

pub mod encoding;
pub mod tokenizer;

pub use encoding::*;
pub use tokenizer::*;
