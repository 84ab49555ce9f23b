pub mod encoder;

#[cfg(test)]
pub mod testing;
