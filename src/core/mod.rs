pub mod catalog;
pub mod config;
pub mod io;
pub mod lore;
pub mod state;
