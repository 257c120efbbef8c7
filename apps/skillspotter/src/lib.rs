//! SkillSpotter client core: authenticated access to the SkillSpotter backend,
//! resume upload with skill extraction, job matching and the admin console.

pub mod admin;
pub mod api_client;
pub mod auth;
pub mod cache;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod matching;
pub mod models;
pub mod pagination;
pub mod processing;
pub mod resume;
pub mod session;
pub mod skills;
pub mod state;
pub mod upload;
