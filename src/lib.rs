pub mod audio;
pub mod config;
pub mod errors;
pub mod factory;
pub mod frame;
pub mod graph;
pub mod nodes;
pub mod parameters;
pub mod plugin;
pub mod processing;

pub use config::{load_routing_file, ConfigError};
pub use errors::{EngineError, EngineResult};
pub use factory::{FactoryError, NodeFactory};
pub use frame::AudioFrame;
pub use graph::{Connection, GraphEngine, GraphState, NodeSpec, Position, RoutingSpec};
pub use nodes::{FileInfo, NodeBuildError, NodeConstructor, BUILTIN_KINDS};
pub use parameters::{BasicParameter, NodeParams, ParameterDescriptor, ParameterError};
pub use plugin::{PluginError, PluginManifest, PluginModule, PluginRegistrar, PluginRegistry, TrustPolicy};
pub use processing::{AudioNode, NodeCategory, NodeContext, NodeInfo, ProcessingError};
