//! Client-side voting: optimistic display state reconciled against the
//! vote endpoints.

pub mod api;
pub mod controller;
mod error;


pub use api::{ClientConfig, HttpVoteApi, VoteApi};
pub use controller::{ClientVoteView, OptimisticVoteController, VoteOutcome, VoteTicket};
pub use error::ClientError;
