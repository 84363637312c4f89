pub mod appearance;
pub mod data;
pub mod io;
pub mod printing;
pub mod settings;
pub mod store;
