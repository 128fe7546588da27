pub mod samples;
pub mod teams;
pub mod users;
