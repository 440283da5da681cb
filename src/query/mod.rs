pub mod matcher;
pub mod parser;
