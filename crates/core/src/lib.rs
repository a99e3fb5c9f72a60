pub mod dashboard;
pub mod filter;
pub mod notice;
pub mod types;
pub mod validate;
