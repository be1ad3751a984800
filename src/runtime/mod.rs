pub mod executor;
pub mod manager;
pub mod request;
pub mod response;
