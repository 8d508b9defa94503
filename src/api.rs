//! HTTP front end: chat, retrieval, status, and the embedded web page.

mod chat;
mod documents;
mod server;
mod state;
mod system;

pub use server::{router, start_http_server};
pub use state::ApiState;
