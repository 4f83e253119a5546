mod store;
mod types;

pub use store::{StateStore, HOME_ENV};
pub use types::*;
