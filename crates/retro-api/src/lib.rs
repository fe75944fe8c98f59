pub mod auth;
pub mod boards;
pub mod emit;
pub mod components;
pub mod events;
pub mod mappers;
pub mod middleware;
pub mod state;
