pub mod cognitive_sample;
pub mod team;
pub mod user;

pub use cognitive_sample::CognitiveSample;
pub use team::{Team, TeamMembers};
pub use user::{NewUser, Role, User};
