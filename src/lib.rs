// Syncdock - HTTP host with a supervised document relay
// Library exports

pub mod config;
pub mod errors;
pub mod server; // HTTP host, static assets, websocket bridge
pub mod service; // Background service contract and the document relay
pub mod signals;
pub mod supervisor; // Startup/shutdown supervision of the background service
