pub mod api;
pub mod auth;
pub mod config;
pub mod cursor;
pub mod discovery;
pub mod dispatch;
pub mod jobs;
pub mod ledger;
pub mod lookup;
pub mod models;
pub mod redirect;
pub mod reviews;
pub mod storage;
