pub mod assignments;
pub mod core;
pub mod courses;
pub mod faculty;
pub mod grades;
pub mod ranks;
pub mod students;
