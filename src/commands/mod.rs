pub mod engines;
pub mod fetch;
pub mod sift;
