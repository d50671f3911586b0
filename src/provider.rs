//! Registration API access: discovery, admin tokens, typed CRUD calls and payloads.

pub mod client;
pub mod metadata;
pub mod registration;
pub mod token;

pub use client::{DeleteOutcome, ProviderClient};
pub use metadata::ProviderMetadata;
pub use registration::{ClientRegistration, IntegrationType, RegisteredClient};
pub use token::TokenExchange;
