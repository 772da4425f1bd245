pub mod args;
pub mod color;
pub mod container;
pub mod errors;
pub mod http;
pub mod manifest;
pub mod prepull;
pub mod resolver;
