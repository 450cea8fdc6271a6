pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod models;
pub mod resources;
pub mod routes;
pub mod schema;
pub mod state;
pub mod utils;
pub mod workflow;

pub use routes::create_router;
pub use state::AppState;
