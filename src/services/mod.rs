pub mod broadcast;
pub mod challenge_service;
pub mod janitor;
pub mod session_service;
