//! chatsync library exports

pub mod api;
pub mod core;
pub mod socket;
pub mod sync;

#[cfg(test)]
pub mod test_support;
