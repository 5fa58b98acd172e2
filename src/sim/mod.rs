pub mod acoustics;
pub mod engine;
pub mod hybrid;
pub mod image_source;
pub mod materials;
pub mod rays;
pub mod scene;
pub mod waveguide;
