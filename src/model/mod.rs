pub mod account;
pub mod booking;
pub mod ids;
pub mod job;
pub mod provider;
pub mod request;
