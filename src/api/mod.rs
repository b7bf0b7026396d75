pub mod account;
pub mod client;

pub use account::Account;
pub use client::ApiClient;
