//! Remote object detection: result types, the API seam, and the clients.

mod api;
pub mod roboflow;
mod result;
mod stub;

pub use api::{DetectionApi, FailureKind, InferenceError};
pub use roboflow::{parse_predictions, RoboflowClient, RoboflowConfig};
pub use result::{BoundingBox, ClassColor, Detection, STRONG_CONFIDENCE};
pub use stub::StubApi;

/// Build the backend for an endpoint. `stub://` endpoints run offline.
pub fn backend_for(config: RoboflowConfig) -> Box<dyn DetectionApi> {
    if config.endpoint.starts_with("stub://") {
        log::info!("detection backend: stub ({})", config.endpoint);
        Box::new(StubApi::default())
    } else {
        log::info!("detection backend: roboflow ({})", config.endpoint);
        Box::new(RoboflowClient::new(config))
    }
}
