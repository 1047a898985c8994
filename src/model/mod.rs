pub mod account;
pub mod application;
pub mod attendance;
pub mod connection;
pub mod interview;
pub mod job;
pub mod leave_request;
pub mod loan_request;
pub mod notice;
pub mod role;
pub mod vendor_project;
