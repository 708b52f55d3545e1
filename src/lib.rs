// Crew Pipeline - an LLM-agent data science team: intake, data engineering, analysis, reporting

pub mod agents;
pub mod analysis;
pub mod config;
pub mod crew;
pub mod deck;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod tools;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
