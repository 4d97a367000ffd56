pub mod auth;
pub mod command;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod mail;
pub mod switch;
