pub mod cache;
pub mod config;
pub mod drill;
pub mod error;
pub mod fetchers;
pub mod filters;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod ranking;
pub mod rpc;
pub mod url_state;
pub mod view;
pub mod window;
