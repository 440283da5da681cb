pub mod model;
pub mod subscription;
