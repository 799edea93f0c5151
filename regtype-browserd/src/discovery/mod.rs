pub mod coordinator;
pub mod keys;
pub mod presenter;
pub mod registry;
pub mod source;
pub mod store;

#[cfg(test)]
pub mod testing;
