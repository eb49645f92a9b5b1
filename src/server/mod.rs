pub mod node;
pub mod settings;

pub use node::Node;
pub use settings::Settings;
