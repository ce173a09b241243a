pub mod messaging;
pub mod repositories;
