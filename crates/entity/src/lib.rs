pub mod activity;
pub mod completion_report;
pub mod contract;
pub mod documentation;
pub mod documentation_photo;
pub mod proposal;
pub mod team;
pub mod team_member;
pub mod user;
pub mod user_role;
pub mod user_secret;
