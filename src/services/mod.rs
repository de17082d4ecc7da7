pub mod background_jobs;
pub mod vote_service;
