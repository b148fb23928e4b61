pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod ws;

pub use routes::create_router;
pub use ws::{spawn_progress_forwarder, WsBroadcaster, WsMessage};
