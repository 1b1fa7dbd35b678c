pub mod attributes;
pub mod catalog;
pub mod error;
pub mod settings;
pub mod size;
