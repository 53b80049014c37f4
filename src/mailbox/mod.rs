pub mod delivery;
pub mod scanner;
pub mod tree;
