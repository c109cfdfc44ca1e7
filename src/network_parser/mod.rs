pub mod chapters;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;
