pub mod product;
pub mod rate;
