pub mod ai;
pub mod research;
