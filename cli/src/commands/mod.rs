pub mod compile;
pub mod evaluate;
pub mod validate;
