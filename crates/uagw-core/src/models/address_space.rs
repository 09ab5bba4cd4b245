//! Address-space view exposed to authenticated clients
//!
//! The view is assembled once at startup and never mutated afterwards, so it
//! is shared as `Arc<AddressSpaceView>` by every session. Variable values
//! are produced by a [`ValueGetter`] on each read.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier part of a [`NodeId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// OPC-UA node identifier (namespace index + identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(id),
        }
    }

    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(id.into()),
        }
    }

    /// `ns=0;i=85`, the standard Objects folder
    pub fn objects_folder() -> Self {
        Self::numeric(0, 85)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(id) => write!(f, "ns={};i={}", self.namespace, id),
            Identifier::String(id) => write!(f, "ns={};s={}", self.namespace, id),
        }
    }
}

/// Error parsing a node id string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid node id: {0}")]
pub struct NodeIdParseError(pub String);

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    /// Accepts `ns=<n>;i=<n>`, `ns=<n>;s=<text>`, `i=<n>` and `s=<text>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NodeIdParseError(s.to_string());

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(err)?;
                (ns.parse::<u16>().map_err(|_| err())?, rest)
            }
            None => (0, s),
        };

        if let Some(id) = rest.strip_prefix("i=") {
            Ok(Self::numeric(namespace, id.parse().map_err(|_| err())?))
        } else if let Some(id) = rest.strip_prefix("s=") {
            Ok(Self::string(namespace, id))
        } else {
            Err(err())
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}

/// Built-in data type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
}

/// Value returned by a variable read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    String(String),
}

impl Variant {
    pub fn data_type(&self) -> DataType {
        match self {
            Variant::String(_) => DataType::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
        }
    }
}

/// Per-read value computation.
///
/// Getters capture whatever they need at build time; they hold no mutable
/// state of their own.
pub type ValueGetter = Arc<dyn Fn() -> Variant + Send + Sync>;

/// Create a getter that always yields the same string
pub fn static_string(value: impl Into<String>) -> ValueGetter {
    let value: String = value.into();
    Arc::new(move || Variant::String(value.clone()))
}

/// Access rights of a variable as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    ReadOnly,
}

/// Variable node
#[derive(Clone)]
pub struct VariableNode {
    pub node_id: NodeId,
    pub browse_name: String,
    pub data_type: DataType,
    pub access: AccessLevel,
    getter: ValueGetter,
}

impl VariableNode {
    /// Read-only string variable
    pub fn string(node_id: NodeId, browse_name: impl Into<String>, getter: ValueGetter) -> Self {
        Self {
            node_id,
            browse_name: browse_name.into(),
            data_type: DataType::String,
            access: AccessLevel::ReadOnly,
            getter,
        }
    }

    /// Evaluate the getter
    pub fn read(&self) -> Variant {
        (self.getter)()
    }

    /// The getter itself, for stack adapters that evaluate it lazily
    pub fn getter(&self) -> ValueGetter {
        self.getter.clone()
    }
}

impl fmt::Debug for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableNode")
            .field("node_id", &self.node_id)
            .field("browse_name", &self.browse_name)
            .field("data_type", &self.data_type)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// Folder organized under the Objects folder
#[derive(Debug, Clone)]
pub struct FolderNode {
    pub node_id: NodeId,
    pub browse_name: String,
    pub variables: Vec<VariableNode>,
}

impl FolderNode {
    pub fn new(node_id: NodeId, browse_name: impl Into<String>) -> Self {
        Self {
            node_id,
            browse_name: browse_name.into(),
            variables: Vec::new(),
        }
    }

    pub fn with_variable(mut self, variable: VariableNode) -> Self {
        self.variables.push(variable);
        self
    }
}

/// How the view was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// No backend session; static placeholder
    Degraded,
    /// Backend connected and browsed
    Proxy,
    /// Backend connected but the browse failed and the half-built folder was kept
    Partial,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Degraded => write!(f, "degraded"),
            ViewMode::Proxy => write!(f, "proxy"),
            ViewMode::Partial => write!(f, "partial"),
        }
    }
}

/// Entry returned when browsing the view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub node_id: NodeId,
    /// Slash-separated browse path below the Objects folder
    pub path: String,
    pub is_folder: bool,
}

/// Node tree the gateway exposes
#[derive(Debug, Clone)]
pub struct AddressSpaceView {
    pub namespace_uri: String,
    pub mode: ViewMode,
    pub folders: Vec<FolderNode>,
}

impl AddressSpaceView {
    pub fn new(namespace_uri: impl Into<String>, mode: ViewMode) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            mode,
            folders: Vec::new(),
        }
    }

    pub fn with_folder(mut self, folder: FolderNode) -> Self {
        self.folders.push(folder);
        self
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn variable_count(&self) -> usize {
        self.folders.iter().map(|f| f.variables.len()).sum()
    }

    /// Variables in tree order
    pub fn variables(&self) -> impl Iterator<Item = &VariableNode> {
        self.folders.iter().flat_map(|f| f.variables.iter())
    }

    /// Find a variable by browse path, e.g. `Gateway/ServerStatus`
    pub fn find(&self, path: &str) -> Option<&VariableNode> {
        let (folder, variable) = path.trim_matches('/').split_once('/')?;
        self.folders
            .iter()
            .find(|f| f.browse_name == folder)?
            .variables
            .iter()
            .find(|v| v.browse_name == variable)
    }

    pub fn find_by_id(&self, node_id: &NodeId) -> Option<&VariableNode> {
        self.variables().find(|v| &v.node_id == node_id)
    }

    /// Flattened listing of every folder and variable
    pub fn browse(&self) -> Vec<BrowseEntry> {
        let mut entries = Vec::new();
        for folder in &self.folders {
            entries.push(BrowseEntry {
                node_id: folder.node_id.clone(),
                path: folder.browse_name.clone(),
                is_folder: true,
            });
            for variable in &folder.variables {
                entries.push(BrowseEntry {
                    node_id: variable.node_id.clone(),
                    path: format!("{}/{}", folder.browse_name, variable.browse_name),
                    is_folder: false,
                });
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_view() -> AddressSpaceView {
        AddressSpaceView::new("urn:test", ViewMode::Degraded).with_folder(
            FolderNode::new(NodeId::string(1, "Gateway"), "Gateway").with_variable(
                VariableNode::string(
                    NodeId::string(1, "Gateway.ServerStatus"),
                    "ServerStatus",
                    static_string("hello"),
                ),
            ),
        )
    }

    #[test]
    fn test_node_id_display_and_parse() {
        assert_eq!(NodeId::objects_folder().to_string(), "ns=0;i=85");
        assert_eq!("ns=0;i=85".parse::<NodeId>().unwrap(), NodeId::objects_folder());
        assert_eq!("i=85".parse::<NodeId>().unwrap(), NodeId::objects_folder());
        assert_eq!(
            "ns=1;s=Gateway.Info".parse::<NodeId>().unwrap(),
            NodeId::string(1, "Gateway.Info")
        );
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=1;g=abc".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_find_by_path() {
        let view = sample_view();
        let var = view.find("Gateway/ServerStatus").unwrap();
        assert_eq!(var.read(), Variant::String("hello".to_string()));
        assert!(view.find("/Gateway/ServerStatus/").is_some());
        assert!(view.find("Gateway/Info").is_none());
        assert!(view.find("Gateway").is_none());
    }

    #[test]
    fn test_getter_runs_on_every_read() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let getter: ValueGetter = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Variant::String("x".to_string())
        });
        let var = VariableNode::string(NodeId::string(1, "X"), "X", getter);

        var.read();
        var.read();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_browse_lists_folders_then_children() {
        let entries = sample_view().browse();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_folder);
        assert_eq!(entries[1].path, "Gateway/ServerStatus");
    }
}
