pub mod dependencies;
pub mod files;
pub mod path;
