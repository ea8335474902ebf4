pub mod domain;
pub mod error;
pub mod protocol;
pub mod timestamp;

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
