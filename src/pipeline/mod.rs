// src/pipeline/mod.rs

pub mod command_remover; // External-program remover used by both binaries

pub use command_remover::CommandRemover;
