//! Wire format types for the vendor APIs
//!
//! Pure serde structs matching each vendor's JSON. Response types default
//! every optional field so that partial payloads still decode; normalizers
//! decide what is actually required.

pub mod anthropic;
pub mod gemini;
pub mod openai;
