pub mod core;
pub mod courses;
pub mod curriculum;
pub mod directory;
pub mod lesson_form;
pub mod lessons;
pub mod materials;
pub mod roles;
pub mod users;
