pub mod agent;
pub mod chat_completion;
pub mod config;
pub mod dispatcher;
pub mod failure;
pub mod message;
pub mod model;
pub mod policy;
pub mod session;
