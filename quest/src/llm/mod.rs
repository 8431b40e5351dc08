//! Model gateway: provider trait, HTTP and dry backends, price table.

pub mod cost;
pub mod gateway;

pub use gateway::{
    Completer, Completion, CompletionRequest, Decoding, DryCompleter, OpenAiCompleter,
    RawCompletion, TextCompleter, complete_code,
};
