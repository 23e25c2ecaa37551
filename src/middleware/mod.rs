pub mod cors;
pub mod gate;

pub use cors::cors_layer;
pub use gate::{edge_gate, EdgeGate};
