pub mod acl;
pub mod config;
pub mod http;
pub mod persistence;
pub mod publish;
pub mod services;
