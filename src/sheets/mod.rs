pub mod gateway;
pub mod records;

pub use gateway::{AppendOutcome, SheetsGateway};
