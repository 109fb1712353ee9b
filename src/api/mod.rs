pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod shortlinks;

pub use handlers::AppState;
pub use routes::create_api_router;
