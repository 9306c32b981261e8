pub mod console;
pub mod extract;
pub mod handlers;
pub mod health;
pub mod routes;

pub use extract::AuthenticatedPartner;
pub use routes::api_routes;
