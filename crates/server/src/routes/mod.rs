pub mod admin;
pub mod auth;
pub mod files;
pub mod messages;
pub mod projects;
