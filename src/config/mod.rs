mod settings;

pub use settings::{
    DeliveryPolicy, HubConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig,
};
