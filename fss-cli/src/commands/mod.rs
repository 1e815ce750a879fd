pub mod console;
pub mod manager;
