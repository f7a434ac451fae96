//! Pipeline container: a typed DAG of named stages

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::time::Instant;
use tracing::Instrument;

use crate::error::{Error, Result};

use super::stage::Stage;
use super::value::{PortSpec, PortValue, PortValues};

/// A registered stage and its port contract
struct StageNode {
    name: String,
    stage: Box<dyn Stage>,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

impl StageNode {
    fn input(&self, port: &str) -> Result<&PortSpec> {
        self.inputs
            .iter()
            .find(|p| p.name == port)
            .ok_or_else(|| Error::UnknownPort {
                stage: self.name.clone(),
                port: port.to_string(),
            })
    }

    fn output(&self, port: &str) -> Result<&PortSpec> {
        self.outputs
            .iter()
            .find(|p| p.name == port)
            .ok_or_else(|| Error::UnknownPort {
                stage: self.name.clone(),
                port: port.to_string(),
            })
    }
}

/// Edge payload: which output feeds which input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub sender_port: String,
    pub receiver_port: String,
}

/// Initial values, addressed by stage and input port
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    values: HashMap<String, PortValues>,
}

impl PipelineInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, stage: impl Into<String>, port: impl Into<String>, value: PortValue) -> Self {
        self.insert(stage, port, value);
        self
    }

    pub fn insert(&mut self, stage: impl Into<String>, port: impl Into<String>, value: PortValue) {
        self.values.entry(stage.into()).or_default().insert(port, value);
    }
}

/// Output values of every stage that ran, keyed by stage name
#[derive(Debug, Clone, Default)]
pub struct PipelineOutputs {
    values: HashMap<String, PortValues>,
}

impl PipelineOutputs {
    /// All outputs of one stage
    pub fn stage(&self, stage: &str) -> Option<&PortValues> {
        self.values.get(stage)
    }

    /// One output value
    pub fn get(&self, stage: &str, port: &str) -> Option<&PortValue> {
        self.values.get(stage).and_then(|v| v.get(port))
    }

    /// Take ownership of one stage's outputs
    pub fn take_stage(&mut self, stage: &str) -> Option<PortValues> {
        self.values.remove(stage)
    }
}

/// Directed acyclic graph of stages executed in dependency order
#[derive(Default)]
pub struct Pipeline {
    graph: DiGraph<StageNode, Connection>,
    index: HashMap<String, NodeIndex>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under a unique name
    pub fn add_stage(&mut self, name: impl Into<String>, stage: impl Stage + 'static) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateStage(name));
        }
        if name.contains('.') {
            return Err(Error::config(format!(
                "stage name '{}' must not contain '.'",
                name
            )));
        }

        let node = StageNode {
            inputs: stage.input_ports(),
            outputs: stage.output_ports(),
            stage: Box::new(stage),
            name: name.clone(),
        };
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        Ok(())
    }

    /// Connect `sender` to `receiver`, each written `stage` or `stage.port`
    ///
    /// An omitted port is resolved by type; exactly one compatible pair must remain.
    pub fn connect(&mut self, sender: &str, receiver: &str) -> Result<()> {
        let (sender_stage, sender_port) = parse_endpoint(sender);
        let (receiver_stage, receiver_port) = parse_endpoint(receiver);

        let sender_idx = self.node_index(sender_stage)?;
        let receiver_idx = self.node_index(receiver_stage)?;
        let sender_node = &self.graph[sender_idx];
        let receiver_node = &self.graph[receiver_idx];

        let sender_candidates: Vec<PortSpec> = match sender_port {
            Some(port) => vec![sender_node.output(port)?.clone()],
            None => sender_node.outputs.clone(),
        };
        let receiver_candidates: Vec<PortSpec> = match receiver_port {
            Some(port) => {
                let spec = receiver_node.input(port)?.clone();
                if self.is_input_connected(receiver_idx, port) {
                    return Err(Error::InputAlreadyConnected {
                        stage: receiver_stage.to_string(),
                        port: port.to_string(),
                    });
                }
                vec![spec]
            }
            None => receiver_node
                .inputs
                .iter()
                .filter(|p| !self.is_input_connected(receiver_idx, &p.name))
                .cloned()
                .collect(),
        };

        if let ([s], [r], Some(_), Some(_)) = (
            sender_candidates.as_slice(),
            receiver_candidates.as_slice(),
            sender_port,
            receiver_port,
        ) {
            if s.port_type != r.port_type {
                return Err(Error::PortTypeMismatch {
                    sender: format!("{}.{}", sender_stage, s.name),
                    sender_type: s.port_type.to_string(),
                    receiver: format!("{}.{}", receiver_stage, r.name),
                    receiver_type: r.port_type.to_string(),
                });
            }
        }

        let pairs: Vec<(&PortSpec, &PortSpec)> = sender_candidates
            .iter()
            .flat_map(|s| {
                receiver_candidates
                    .iter()
                    .filter(move |r| r.port_type == s.port_type)
                    .map(move |r| (s, r))
            })
            .collect();

        let (s, r) = match pairs.as_slice() {
            [] => {
                return Err(Error::NoCompatiblePorts {
                    sender: sender.to_string(),
                    receiver: receiver.to_string(),
                })
            }
            [pair] => *pair,
            many => {
                let candidates = many
                    .iter()
                    .map(|(s, r)| {
                        format!("{}.{} -> {}.{}", sender_stage, s.name, receiver_stage, r.name)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Error::AmbiguousConnection {
                    sender: sender.to_string(),
                    receiver: receiver.to_string(),
                    candidates,
                });
            }
        };

        tracing::debug!(
            "Connecting {}.{} -> {}.{}",
            sender_stage,
            s.name,
            receiver_stage,
            r.name
        );

        let connection = Connection {
            sender_port: s.name.clone(),
            receiver_port: r.name.clone(),
        };
        self.graph.add_edge(sender_idx, receiver_idx, connection);
        Ok(())
    }

    /// Check the graph is acyclic
    pub fn validate(&self) -> Result<()> {
        self.execution_order().map(|_| ())
    }

    /// Declared edges as `("sender.port", "receiver.port")`
    pub fn connections(&self) -> Vec<(String, String)> {
        self.graph
            .edge_references()
            .map(|edge| {
                let c = edge.weight();
                (
                    format!("{}.{}", self.graph[edge.source()].name, c.sender_port),
                    format!("{}.{}", self.graph[edge.target()].name, c.receiver_port),
                )
            })
            .collect()
    }

    /// Execute every stage in dependency order
    ///
    /// Fails before running anything if the graph has a cycle or the inputs
    /// address unknown or already-connected ports.
    pub async fn run(&self, inputs: PipelineInputs) -> Result<PipelineOutputs> {
        let order = self.execution_order()?;
        let mut pending = self.seed_inputs(inputs)?;
        let mut outputs = PipelineOutputs::default();

        tracing::info!("Running pipeline with {} stages", order.len());

        for idx in order {
            let node = &self.graph[idx];
            let stage_inputs = pending.remove(&idx).unwrap_or_default();

            if let Some(missing) = node
                .inputs
                .iter()
                .find(|p| p.required && !stage_inputs.contains(&p.name))
            {
                return Err(Error::MissingInput {
                    stage: node.name.clone(),
                    port: missing.name.clone(),
                });
            }

            let span = tracing::info_span!("stage", name = %node.name, kind = node.stage.type_name());
            let started = Instant::now();
            let produced = node
                .stage
                .run(stage_inputs)
                .instrument(span)
                .await
                .map_err(|e| {
                    tracing::error!("Stage '{}' failed: {}", node.name, e);
                    Error::StageFailed {
                        stage: node.name.clone(),
                        source: Box::new(e),
                    }
                })?;

            tracing::debug!(
                "Stage '{}' finished in {:?} with {} outputs",
                node.name,
                started.elapsed(),
                produced.len()
            );

            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let connection = edge.weight();
                if let Some(value) = produced.get(&connection.sender_port) {
                    pending
                        .entry(edge.target())
                        .or_default()
                        .insert(connection.receiver_port.clone(), value.clone());
                }
            }

            outputs.values.insert(node.name.clone(), produced);
        }

        Ok(outputs)
    }

    fn node_index(&self, stage: &str) -> Result<NodeIndex> {
        self.index
            .get(stage)
            .copied()
            .ok_or_else(|| Error::UnknownStage(stage.to_string()))
    }

    fn is_input_connected(&self, idx: NodeIndex, port: &str) -> bool {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .any(|edge| edge.weight().receiver_port == port)
    }

    fn execution_order(&self) -> Result<Vec<NodeIndex>> {
        toposort(&self.graph, None)
            .map_err(|cycle| Error::Cycle(self.graph[cycle.node_id()].name.clone()))
    }

    fn seed_inputs(&self, inputs: PipelineInputs) -> Result<HashMap<NodeIndex, PortValues>> {
        let mut pending: HashMap<NodeIndex, PortValues> = HashMap::new();

        for (stage, values) in inputs.values {
            let idx = self.node_index(&stage)?;
            let node = &self.graph[idx];

            for (port, value) in values {
                let spec = node.input(&port)?;
                if spec.port_type != value.port_type() {
                    return Err(Error::PortTypeMismatch {
                        sender: "pipeline input".to_string(),
                        sender_type: value.port_type().to_string(),
                        receiver: format!("{}.{}", stage, port),
                        receiver_type: spec.port_type.to_string(),
                    });
                }
                if self.is_input_connected(idx, &port) {
                    return Err(Error::InputAlreadyConnected { stage, port });
                }
                pending.entry(idx).or_default().insert(port, value);
            }
        }

        Ok(pending)
    }
}

fn parse_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once('.') {
        Some((stage, port)) => (stage, Some(port)),
        None => (endpoint, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::value::PortType;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type CallLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

    /// Appends its name to the incoming text and records each call
    struct Recorder {
        name: &'static str,
        log: CallLog,
        required_input: bool,
        fail: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &CallLog) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                required_input: false,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Stage for Recorder {
        fn type_name(&self) -> &'static str {
            "Recorder"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            if self.required_input {
                vec![PortSpec::required("text", PortType::Text)]
            } else {
                vec![PortSpec::optional("text", PortType::Text)]
            }
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![
                PortSpec::required("text", PortType::Text),
                PortSpec::required("count", PortType::Integer),
            ]
        }

        async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
            let incoming = inputs.take_text("text").ok();
            self.log.lock().push((self.name.to_string(), incoming.clone()));
            if self.fail {
                return Err(Error::internal("boom"));
            }
            let text = format!("{}>{}", incoming.unwrap_or_default(), self.name);
            Ok(PortValues::new()
                .with("text", PortValue::Text(text))
                .with("count", PortValue::Integer(1)))
        }
    }

    fn log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Two text inputs and two text outputs
    struct TwoLanes;

    #[async_trait]
    impl Stage for TwoLanes {
        fn type_name(&self) -> &'static str {
            "TwoLanes"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            vec![
                PortSpec::optional("left", PortType::Text),
                PortSpec::optional("right", PortType::Text),
            ]
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![
                PortSpec::required("left", PortType::Text),
                PortSpec::required("right", PortType::Text),
            ]
        }

        async fn run(&self, _inputs: PortValues) -> Result<PortValues> {
            Ok(PortValues::new()
                .with("left", PortValue::Text(String::new()))
                .with("right", PortValue::Text(String::new())))
        }
    }

    #[test]
    fn test_duplicate_stage_name() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        let err = pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap_err();
        assert!(matches!(err, Error::DuplicateStage(name) if name == "a"));
    }

    #[test]
    fn test_stage_name_with_dot_is_rejected() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        assert!(matches!(
            pipeline.add_stage("a.b", Recorder::new("a.b", &calls)),
            Err(Error::Config(_))
        ));
        assert!(pipeline.connections().is_empty());
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
    }

    #[test]
    fn test_connect_unknown_endpoints() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", Recorder::new("b", &calls)).unwrap();

        assert!(matches!(
            pipeline.connect("a.text", "missing.text"),
            Err(Error::UnknownStage(name)) if name == "missing"
        ));
        assert!(matches!(
            pipeline.connect("a.nope", "b.text"),
            Err(Error::UnknownPort { stage, port }) if stage == "a" && port == "nope"
        ));
    }

    #[test]
    fn test_connect_checks_types() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", Recorder::new("b", &calls)).unwrap();

        assert!(matches!(
            pipeline.connect("a.count", "b.text"),
            Err(Error::PortTypeMismatch { .. })
        ));
        // implicit resolution picks the only Text pair
        pipeline.connect("a", "b").unwrap();
        assert_eq!(
            pipeline.connections(),
            vec![("a.text".to_string(), "b.text".to_string())]
        );
        // b.text is now taken
        assert!(matches!(
            pipeline.connect("a.text", "b.text"),
            Err(Error::InputAlreadyConnected { .. })
        ));
        assert!(matches!(
            pipeline.connect("a", "b"),
            Err(Error::NoCompatiblePorts { .. })
        ));
    }

    #[test]
    fn test_implicit_connect_with_several_matches_is_ambiguous() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", TwoLanes).unwrap();
        pipeline.add_stage("b", TwoLanes).unwrap();

        let err = pipeline.connect("a", "b").unwrap_err();
        match err {
            Error::AmbiguousConnection { candidates, .. } => {
                assert!(candidates.contains("a.left -> b.left"));
                assert!(candidates.contains("a.right -> b.right"));
            }
            other => panic!("expected AmbiguousConnection, got {other:?}"),
        }
        assert!(pipeline.connections().is_empty());

        // naming one side narrows it to a single pair
        pipeline.connect("a.left", "b.right").unwrap();
        assert_eq!(
            pipeline.connections(),
            vec![("a.left".to_string(), "b.right".to_string())]
        );
    }

    #[tokio::test]
    async fn test_linear_pipeline_runs_in_dependency_order() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        // registration order differs from execution order
        pipeline.add_stage("c", Recorder::new("c", &calls)).unwrap();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", Recorder::new("b", &calls)).unwrap();
        pipeline.connect("a.text", "b.text").unwrap();
        pipeline.connect("b.text", "c.text").unwrap();
        pipeline.validate().unwrap();

        let inputs = PipelineInputs::new().with("a", "text", PortValue::Text("start".into()));
        let outputs = pipeline.run(inputs).await.unwrap();

        let calls = calls.lock().clone();
        let order: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        let b_output = outputs.get("b", "text").cloned();
        assert_eq!(b_output, Some(PortValue::Text("start>a>b".into())));
        assert_eq!(calls[2].1.as_deref(), Some("start>a>b"));
        assert_eq!(
            outputs.get("c", "text"),
            Some(&PortValue::Text("start>a>b>c".into()))
        );
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_stage_runs() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", Recorder::new("b", &calls)).unwrap();
        pipeline.connect("a.text", "b.text").unwrap();
        pipeline.connect("b.text", "a.text").unwrap();

        assert!(matches!(pipeline.validate(), Err(Error::Cycle(_))));
        let err = pipeline.run(PipelineInputs::new()).await.unwrap_err();
        assert!(matches!(err, Error::Cycle(_)));
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_input() {
        let calls = log();
        let mut stage = Recorder::new("a", &calls);
        stage.required_input = true;
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", stage).unwrap();

        let err = pipeline.run(PipelineInputs::new()).await.unwrap_err();
        assert!(matches!(err, Error::MissingInput { stage, port } if stage == "a" && port == "text"));
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_stops_run_and_names_stage() {
        let calls = log();
        let mut failing = Recorder::new("b", &calls);
        failing.fail = true;
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", failing).unwrap();
        pipeline.add_stage("c", Recorder::new("c", &calls)).unwrap();
        pipeline.connect("a.text", "b.text").unwrap();
        pipeline.connect("b.text", "c.text").unwrap();

        let err = pipeline.run(PipelineInputs::new()).await.unwrap_err();
        assert_eq!(err.failed_stage(), Some("b"));
        let order: Vec<String> = calls.lock().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_initial_inputs_are_validated() {
        let calls = log();
        let mut pipeline = Pipeline::new();
        pipeline.add_stage("a", Recorder::new("a", &calls)).unwrap();
        pipeline.add_stage("b", Recorder::new("b", &calls)).unwrap();
        pipeline.connect("a.text", "b.text").unwrap();

        let unknown_stage = PipelineInputs::new().with("prompt", "query", PortValue::Text("q".into()));
        assert!(matches!(
            pipeline.run(unknown_stage).await,
            Err(Error::UnknownStage(name)) if name == "prompt"
        ));

        let wrong_type = PipelineInputs::new().with("a", "text", PortValue::Integer(3));
        assert!(matches!(
            pipeline.run(wrong_type).await,
            Err(Error::PortTypeMismatch { .. })
        ));

        let connected = PipelineInputs::new().with("b", "text", PortValue::Text("x".into()));
        assert!(matches!(
            pipeline.run(connected).await,
            Err(Error::InputAlreadyConnected { .. })
        ));
        assert!(calls.lock().is_empty());
    }
}
