//! Stage graph: typed ports, the stage contract and the pipeline container

mod graph;
pub mod stage;
pub mod value;

pub use graph::{Connection, Pipeline, PipelineInputs, PipelineOutputs};
pub use stage::Stage;
pub use value::{PortSpec, PortType, PortValue, PortValues};
