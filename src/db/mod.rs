mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{CognitiveSample, NewUser, Role, Team, TeamMembers, User};
pub use repositories::{samples::RECENT_SAMPLES_LIMIT, users::DEFAULT_MANAGER_USERNAME};
