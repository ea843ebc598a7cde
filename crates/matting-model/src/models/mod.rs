pub mod decoder;
pub mod encoder;
pub mod matting_net;
pub mod modules;
pub mod refiner;
