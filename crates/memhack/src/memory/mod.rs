pub mod error;
pub mod layers;
