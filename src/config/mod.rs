mod settings;

pub use settings::{Settings, TransportConfig};
