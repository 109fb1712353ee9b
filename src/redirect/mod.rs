pub mod handlers;
pub mod links;
pub mod routes;

pub use handlers::RedirectState;
pub use routes::create_redirect_router;
