pub mod health;
pub mod threads;
pub mod votes;

#[cfg(test)]
mod tests;
