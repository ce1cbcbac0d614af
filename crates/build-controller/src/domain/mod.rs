pub mod build;
pub mod dispatcher;
