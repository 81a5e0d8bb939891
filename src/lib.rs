pub mod api;
pub mod core;
pub mod feeds;
pub mod strategy;
pub mod trading;
pub mod web;
