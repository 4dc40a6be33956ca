use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node (segment or source) in the flow graph.
    pub struct NodeId;

    /// Identifies a directed flow edge between two nodes.
    pub struct EdgeId;

    /// Identifies a steward (economic agent).
    pub struct StewardId;
}
