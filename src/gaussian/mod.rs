pub mod aabb;
pub mod cloud;
pub mod covariance;
pub mod f16;
pub mod packed;
pub mod quantization;
pub mod rand;
pub mod settings;
