pub mod resource;
pub mod transaction;
