pub mod clock;
pub mod extractor;
pub mod ids;
pub mod jwt;
pub mod test_utils;
