mod cors;
mod handler;

pub use cors::Gatekeeper;
pub use handler::VideoHandler;
