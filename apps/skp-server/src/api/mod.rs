pub mod achievements;
pub mod meta;
pub mod students;
