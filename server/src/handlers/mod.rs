pub mod analytics;
pub mod links;
pub mod redirect;
pub mod track;
