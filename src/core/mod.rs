pub mod builder;
pub mod credentials;
pub mod merger;

pub use builder::{BuildRequest, BuildStage, Builder};
