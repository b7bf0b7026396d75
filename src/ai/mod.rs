pub mod completion;

pub use completion::{CompletionClient, spawn_reply};
