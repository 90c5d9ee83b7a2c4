pub mod batch;
pub mod remover;
pub mod server;

pub use remover::{load_remover_config, RemoverConfig};
