pub mod client;
pub mod manual;
pub mod remote;

pub use client::{ChatClient, ChatClientError};
pub use manual::{extract_section, fallback_manual};
pub use remote::RemoteAdvisor;
