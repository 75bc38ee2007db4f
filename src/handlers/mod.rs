pub mod api;
pub mod redirect;
pub mod ws;
