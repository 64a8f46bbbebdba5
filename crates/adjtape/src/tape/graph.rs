//! The tape: an ordered log of blocks plus the thread-local working tape.

use super::annotation::stop_annotating;
use super::block::Block;
use super::block_variable::{BlockVariableRef, VariableId};
use crate::error::AdjointError;
use log::{debug, trace};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

/// Shared handle to a tape.
pub type SharedTape = Rc<RefCell<Tape>>;

/// Ordered log of recorded blocks.
///
/// Insertion order is causal order: a block can only depend on variables
/// produced by earlier blocks or created before recording.
#[derive(Default)]
pub struct Tape {
    blocks: Vec<Box<dyn Block>>,
}

/// Node of the tape's dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeNode {
    /// A block variable.
    Variable(VariableId),
    /// The block at the given tape position.
    Block { index: usize, name: &'static str },
}

impl Tape {
    /// Create a new empty tape.
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Create a new empty tape behind a shared handle.
    pub fn shared() -> SharedTape {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Append a block and return its position.
    pub fn add_block(&mut self, block: Box<dyn Block>) -> usize {
        trace!(
            "recording {} at index {} ({} deps, {} outputs)",
            block.name(),
            self.blocks.len(),
            block.dependencies().len(),
            block.outputs().len()
        );
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All blocks in insertion order.
    pub fn blocks(&self) -> &[Box<dyn Block>] {
        &self.blocks
    }

    /// Get block by position.
    pub fn get_block(&self, index: usize) -> Option<&dyn Block> {
        self.blocks.get(index).map(|b| b.as_ref())
    }

    /// Reverse sweep: every block's adjoint rule, last to first.
    ///
    /// Adjoints must be seeded beforehand; without a seed every adjoint
    /// stays zero.
    pub fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let _guard = stop_annotating();
        debug!("adjoint sweep over {} blocks", self.blocks.len());
        for block in self.blocks.iter().rev() {
            block.evaluate_adj()?;
        }
        Ok(())
    }

    /// Forward sweep: every block's tangent rule, first to last.
    pub fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let _guard = stop_annotating();
        debug!("tangent sweep over {} blocks", self.blocks.len());
        for block in &self.blocks {
            block.evaluate_tlm()?;
        }
        Ok(())
    }

    /// Second-order reverse sweep, last to first.
    ///
    /// Needs the adjoint and tangent accumulators from the first-order
    /// sweeps.
    pub fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let _guard = stop_annotating();
        debug!("hessian sweep over {} blocks", self.blocks.len());
        for block in self.blocks.iter().rev() {
            block.evaluate_hessian()?;
        }
        Ok(())
    }

    /// Replay every block's recompute rule in recording order.
    pub fn recompute(&self) -> Result<(), AdjointError> {
        let _guard = stop_annotating();
        debug!("recomputing {} blocks", self.blocks.len());
        for block in &self.blocks {
            block.recompute()?;
        }
        Ok(())
    }

    /// Reset adjoint, tangent and Hessian accumulators of all variables.
    pub fn reset_variables(&self) {
        for block in self.blocks.iter().rev() {
            block.reset_variables();
        }
    }

    /// Reset only the tangent accumulators.
    pub fn reset_tlm_values(&self) {
        self.for_each_variable(|var| var.reset_tlm_value());
    }

    /// Reset only the second-order accumulators.
    pub fn reset_hessian_values(&self) {
        self.for_each_variable(|var| var.reset_hessian_value());
    }

    fn for_each_variable(&self, f: impl Fn(&BlockVariableRef)) {
        for block in &self.blocks {
            block
                .dependencies()
                .iter()
                .chain(block.outputs())
                .for_each(&f);
        }
    }

    /// Reset all variables and drop every block.
    pub fn reset_blocks(&mut self) {
        self.reset_variables();
        debug!("clearing {} blocks", self.blocks.len());
        self.blocks.clear();
    }

    /// Alias of [`Tape::reset_blocks`].
    pub fn clear_tape(&mut self) {
        self.reset_blocks();
    }

    /// Build the bipartite variable/block dependency graph.
    ///
    /// Edges point in data flow direction: dependency to block, block to
    /// output.
    pub fn dependency_graph(&self) -> DiGraph<TapeNode, ()> {
        let mut graph = DiGraph::new();
        let mut variables: HashMap<VariableId, NodeIndex> = HashMap::new();

        let mut variable_node = |graph: &mut DiGraph<TapeNode, ()>, var: &BlockVariableRef| {
            *variables
                .entry(var.id())
                .or_insert_with(|| graph.add_node(TapeNode::Variable(var.id())))
        };

        for (index, block) in self.blocks.iter().enumerate() {
            let block_node = graph.add_node(TapeNode::Block {
                index,
                name: block.name(),
            });
            for dep in block.dependencies() {
                let dep_node = variable_node(&mut graph, dep);
                graph.add_edge(dep_node, block_node, ());
            }
            for out in block.outputs() {
                let out_node = variable_node(&mut graph, out);
                graph.add_edge(block_node, out_node, ());
            }
        }
        graph
    }

    /// Drop blocks that do not contribute to any of `functionals`.
    ///
    /// Remaining blocks keep their relative order. Returns the number of
    /// blocks removed.
    pub fn optimize_for_functionals(&mut self, functionals: &[BlockVariableRef]) -> usize {
        let graph = self.dependency_graph();
        let reversed = Reversed(&graph);

        let starts: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|&n| match graph[n] {
                TapeNode::Variable(id) => functionals.iter().any(|f| f.id() == id),
                TapeNode::Block { .. } => false,
            })
            .collect();

        let mut keep = vec![false; self.blocks.len()];
        if let Some(&first) = starts.first() {
            let mut dfs = Dfs::new(reversed, first);
            for &start in &starts {
                dfs.move_to(start);
                while let Some(node) = dfs.next(reversed) {
                    if let TapeNode::Block { index, .. } = graph[node] {
                        keep[index] = true;
                    }
                }
            }
        }

        let before = self.blocks.len();
        let mut flags = keep.into_iter();
        self.blocks.retain(|_| flags.next().unwrap_or(false));
        let removed = before - self.blocks.len();
        debug!("tape optimization removed {removed} of {before} blocks");
        removed
    }

    /// Render the dependency graph in Graphviz dot format.
    pub fn to_dot(&self) -> String {
        let graph = self.dependency_graph();
        format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

impl Debug for Tape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tape")
            .field("num_blocks", &self.blocks.len())
            .finish()
    }
}

// Thread-local working tape
thread_local! {
    static WORKING_TAPE: RefCell<SharedTape> = RefCell::new(Tape::shared());
}

/// The tape new overloaded values bind to on this thread.
pub fn get_working_tape() -> SharedTape {
    WORKING_TAPE.with(|t| Rc::clone(&t.borrow()))
}

/// Replace the working tape, returning the previous one.
pub fn set_working_tape(tape: SharedTape) -> SharedTape {
    WORKING_TAPE.with(|t| t.replace(tape))
}

/// Scope guard returned by [`push_working_tape`].
#[must_use = "the previous tape is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct WorkingTapeGuard {
    previous: Option<SharedTape>,
}

/// Make `tape` the working tape until the returned guard is dropped.
///
/// # Example
///
/// ```
/// use adjtape::tape::{Tape, get_working_tape, push_working_tape};
/// use std::rc::Rc;
///
/// let scratch = Tape::shared();
/// {
///     let _guard = push_working_tape(Rc::clone(&scratch));
///     assert!(Rc::ptr_eq(&get_working_tape(), &scratch));
/// }
/// assert!(!Rc::ptr_eq(&get_working_tape(), &scratch));
/// ```
pub fn push_working_tape(tape: SharedTape) -> WorkingTapeGuard {
    WorkingTapeGuard {
        previous: Some(set_working_tape(tape)),
    }
}

impl Drop for WorkingTapeGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_working_tape(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::block::BlockIo;
    use crate::tape::block_variable::BlockVariable;
    use crate::value::Value;

    // Passes the output adjoint through, scaled.
    #[derive(Debug)]
    struct ScaleBlock {
        io: BlockIo,
        scale: f64,
    }

    impl ScaleBlock {
        fn new(input: &BlockVariableRef, output: &BlockVariableRef, scale: f64) -> Self {
            let mut io = BlockIo::new();
            io.add_dependency(input);
            io.add_output(output);
            Self { io, scale }
        }
    }

    impl Block for ScaleBlock {
        fn name(&self) -> &'static str {
            "ScaleBlock"
        }

        fn dependencies(&self) -> &[BlockVariableRef] {
            self.io.dependencies()
        }

        fn outputs(&self) -> &[BlockVariableRef] {
            self.io.outputs()
        }

        fn evaluate_adj(&self) -> Result<(), AdjointError> {
            let Some(adj) = self.outputs()[0].adj_value() else {
                return Ok(());
            };
            self.dependencies()[0].add_adj_output(adj.scale(self.scale))
        }
    }

    fn float_var(x: f64) -> BlockVariableRef {
        BlockVariable::new(Value::Float(x))
    }

    #[test]
    fn test_add_block_returns_index() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        let c = float_var(4.0);
        assert_eq!(tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0))), 0);
        assert_eq!(tape.add_block(Box::new(ScaleBlock::new(&b, &c, 2.0))), 1);
        assert_eq!(tape.len(), 2);
        assert_eq!(tape.get_block(1).unwrap().name(), "ScaleBlock");
    }

    #[test]
    fn test_empty_tape_sweeps_are_noops() {
        let tape = Tape::new();
        assert!(tape.evaluate_adj().is_ok());
        assert!(tape.evaluate_tlm().is_ok());
        assert!(tape.evaluate_hessian().is_ok());
        assert!(tape.recompute().is_ok());
    }

    #[test]
    fn test_evaluate_adj_chain() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        let c = float_var(6.0);
        tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0)));
        tape.add_block(Box::new(ScaleBlock::new(&b, &c, 3.0)));

        c.set_initial_adj_input(Value::Float(1.0)).unwrap();
        tape.evaluate_adj().unwrap();

        assert_eq!(a.adj_output(), Value::Float(6.0));
        assert_eq!(b.adj_output(), Value::Float(3.0));
    }

    #[test]
    fn test_missing_rule_aborts_sweep() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0)));
        let err = tape.evaluate_tlm().unwrap_err();
        assert!(matches!(err, AdjointError::MissingRule { block: "ScaleBlock", .. }));
    }

    #[test]
    fn test_clear_tape() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0)));
        a.add_adj_output(Value::Float(1.0)).unwrap();

        tape.clear_tape();

        assert!(tape.is_empty());
        assert!(a.adj_value().is_none());
    }

    #[test]
    fn test_optimize_for_functionals() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        let unrelated_in = float_var(1.0);
        let unrelated_out = float_var(5.0);
        let c = float_var(4.0);
        tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0)));
        tape.add_block(Box::new(ScaleBlock::new(&unrelated_in, &unrelated_out, 5.0)));
        tape.add_block(Box::new(ScaleBlock::new(&b, &c, 2.0)));

        let removed = tape.optimize_for_functionals(&[Rc::clone(&c)]);

        assert_eq!(removed, 1);
        assert_eq!(tape.len(), 2);
        assert!(Rc::ptr_eq(&tape.blocks()[1].outputs()[0], &c));
    }

    #[test]
    fn test_dependency_graph_and_dot() {
        let mut tape = Tape::new();
        let a = float_var(1.0);
        let b = float_var(2.0);
        tape.add_block(Box::new(ScaleBlock::new(&a, &b, 2.0)));

        let graph = tape.dependency_graph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let dot = tape.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("ScaleBlock"));
    }

    #[test]
    fn test_working_tape_swap() {
        let original = get_working_tape();
        let scratch = Tape::shared();
        {
            let _guard = push_working_tape(Rc::clone(&scratch));
            assert!(Rc::ptr_eq(&get_working_tape(), &scratch));
        }
        assert!(Rc::ptr_eq(&get_working_tape(), &original));

        let previous = set_working_tape(Rc::clone(&scratch));
        assert!(Rc::ptr_eq(&previous, &original));
        set_working_tape(previous);
    }
}
