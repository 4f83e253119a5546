pub mod browser;
pub mod callback;
pub mod credentials;
pub mod mode;
pub mod oauth;
mod pkce;
