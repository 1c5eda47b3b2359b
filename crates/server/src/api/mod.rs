pub mod handlers;
pub mod middleware;
pub mod reconciler;
pub mod routes;

pub use routes::create_router;
