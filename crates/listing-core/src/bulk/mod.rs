pub mod manager;
pub mod storage;
pub mod types;
pub mod worker;

#[cfg(test)]
mod tests;
