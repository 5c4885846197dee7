pub mod claims;
pub mod vision;

pub use vision::VisionClient;
