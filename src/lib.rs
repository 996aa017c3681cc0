pub mod account;
pub mod api;
pub mod auth;
pub mod bookmarks;
pub mod config;
pub mod error;
pub mod keywords;
pub mod logger;
pub mod models;
pub mod news_feed;
pub mod prefs;
pub mod tracking;
pub mod utils;

#[cfg(test)]
mod testing;
