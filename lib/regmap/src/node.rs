//! Tree nodes: naming, attachment, path computation and lookup.
//!
//! A node is owned by its parent's child list through a [Handle]; the parent link is a
//! [HandleRef] set exactly once when the node is added. Once a root has been started every node
//! below it is marked attached and the shape of the tree is frozen.

use crate::{
    command::Command,
    device::Device,
    error::{RegError, RegResult},
    lookup::{ArrayGroup, ArrayKey, Lookup, parse_index, select, split_indexed},
    variable::Variable,
};
use core::{
    fmt::Debug,
    sync::atomic::{AtomicBool, Ordering},
};
use spin::{Once, RwLock};
use utils::handle::{Handle, HandleRef};

/// Owning handle to a node.
pub type NodeHandle = Handle<Node>;

pub struct Node {
    name: Box<str>,
    description: Box<str>,
    hidden: AtomicBool,
    this: HandleRef<Node>,
    parent: Once<HandleRef<Node>>,
    children: RwLock<Vec<NodeHandle>>,
    attached: AtomicBool,
    kind: NodeKind,
}

/// What a node is, beyond its place in the tree.
pub enum NodeKind {
    Device(Device),
    Variable(Variable),
    Command(Command),
}

impl Node {
    pub(crate) fn create(
        name: &str,
        description: &str,
        hidden: bool,
        kind: impl FnOnce(&HandleRef<Node>) -> NodeKind,
    ) -> NodeHandle {
        Handle::new_cyclic(|this| Node {
            name: Box::from(name),
            description: Box::from(description),
            hidden: AtomicBool::new(hidden),
            kind: kind(&this),
            this,
            parent: Once::new(),
            children: RwLock::new(vec![]),
            attached: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Relaxed)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Relaxed);
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_device(&self) -> Option<&Device> {
        match &self.kind {
            NodeKind::Device(dev) => Some(dev),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            NodeKind::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match &self.kind {
            NodeKind::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn is_device(&self) -> bool {
        self.as_device().is_some()
    }

    pub(crate) fn device_or_err(&self) -> RegResult<&Device> {
        self.as_device().ok_or_else(|| RegError::WrongKind {
            path: self.path(),
            expected: "device",
        })
    }

    pub(crate) fn variable_or_err(&self) -> RegResult<&Variable> {
        self.as_variable().ok_or_else(|| RegError::WrongKind {
            path: self.path(),
            expected: "variable",
        })
    }

    /// A weak reference to this node.
    pub fn create_ref(&self) -> HandleRef<Node> {
        self.this.clone()
    }

    /// A strong handle to this node, if it is still owned by someone.
    pub fn handle(&self) -> Option<NodeHandle> {
        self.this.get_handle()
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent.get().and_then(|p| p.get_handle())
    }

    /// The device this node belongs to: the parent of a variable or command, or the parent
    /// device of a device.
    pub fn parent_device(&self) -> Option<NodeHandle> {
        self.parent().filter(|p| p.is_device())
    }

    /// The top of the tree this node is in.
    pub fn root(&self) -> Option<NodeHandle> {
        match self.parent() {
            Some(parent) => parent.root(),
            None => self.handle(),
        }
    }

    /// Dot-joined names from the top of the tree down to this node.
    pub fn path(&self) -> String {
        match self.parent() {
            Some(parent) => parent.path() + "." + &self.name,
            None => String::from(&*self.name),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_attached(&self) {
        self.attached.store(true, Ordering::Release);
    }

    /// Whether `node` is this node or one of its ancestors.
    fn descends_from(&self, node: &NodeHandle) -> bool {
        if self.this.refers_to(node) {
            return true;
        }
        let mut cur = self.parent();
        while let Some(p) = cur {
            if p.ptr_eq(node) {
                return true;
            }
            cur = p.parent();
        }
        false
    }

    /// Add `node` as the last child of this node.
    pub fn add(&self, node: NodeHandle) -> RegResult<()> {
        if self.descends_from(&node) {
            return Err(RegError::Cycle {
                parent: self.path(),
                name: node.name().into(),
            });
        }
        let mut children = self.children.write();
        if node.parent.get().is_some() || node.is_attached() {
            return Err(RegError::AlreadyAttached {
                parent: self.path(),
                name: node.name().into(),
            });
        }
        if children.iter().any(|c| c.name == node.name) {
            return Err(RegError::NameCollision {
                parent: self.path(),
                name: node.name().into(),
            });
        }
        if self.is_attached() {
            return Err(RegError::TreeAlreadyRooted {
                parent: self.path(),
                name: node.name().into(),
            });
        }
        let mut claimed = false;
        node.parent.call_once(|| {
            claimed = true;
            self.this.clone()
        });
        if !claimed {
            return Err(RegError::AlreadyAttached {
                parent: self.path(),
                name: node.name().into(),
            });
        }
        children.push(node);
        Ok(())
    }

    /// Attach a freshly created child without the checks of [Node::add].
    pub(crate) fn adopt(&self, node: NodeHandle) {
        node.parent.call_once(|| self.this.clone());
        self.children.write().push(node);
    }

    /// Add every node of `nodes`, stopping at the first failure.
    pub fn add_nodes(&self, nodes: impl IntoIterator<Item = NodeHandle>) -> RegResult<()> {
        for node in nodes {
            self.add(node)?;
        }
        Ok(())
    }

    /// All children in declaration order.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.children.read().clone()
    }

    pub fn devices(&self) -> Vec<NodeHandle> {
        self.filter_children(|n| n.is_device())
    }

    pub fn variables(&self) -> Vec<NodeHandle> {
        self.filter_children(|n| n.as_variable().is_some())
    }

    pub fn commands(&self) -> Vec<NodeHandle> {
        self.filter_children(|n| n.as_command().is_some())
    }

    fn filter_children(&self, f: impl Fn(&Node) -> bool) -> Vec<NodeHandle> {
        self.children
            .read()
            .iter()
            .filter(|n| f(n))
            .cloned()
            .collect()
    }

    /// The child named exactly `name`.
    pub fn node(&self, name: &str) -> RegResult<NodeHandle> {
        self.children
            .read()
            .iter()
            .find(|c| &*c.name == name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    /// The child named `name`, or else the array group named `name`.
    pub fn lookup(&self, name: &str) -> RegResult<Lookup> {
        match self.node(name) {
            Ok(node) => Ok(Lookup::Node(node)),
            Err(_) => self.array(name).map(Lookup::Array),
        }
    }

    /// Children named `base[key]`, keyed by the parsed `key`, in the order they were added.
    pub fn array(&self, base: &str) -> RegResult<ArrayGroup> {
        let group: Vec<(ArrayKey, NodeHandle)> = self
            .children
            .read()
            .iter()
            .filter_map(|child| {
                let (b, key) = split_indexed(child.name())?;
                (b == base).then(|| (ArrayKey::parse(key), child.clone()))
            })
            .collect();
        if group.is_empty() {
            return Err(self.not_found(base));
        }
        Ok(ArrayGroup::from(group))
    }

    /// Resolve one name segment: an exact child name, or `base[key]`, `base[*]`, `base[a:b]`.
    pub fn node_match(&self, expr: &str) -> RegResult<Vec<NodeHandle>> {
        if let Ok(node) = self.node(expr) {
            return Ok(vec![node]);
        }
        let (base, index) = split_indexed(expr).ok_or_else(|| self.not_found(expr))?;
        let index = parse_index(expr, index)?;
        let group = self.array(base)?;
        select(&self.path(), expr, &group, &index)
    }

    /// Resolve a dotted path relative to this node. Every segment may be an index expression;
    /// a bare `*` selects every child.
    pub fn get_nodes(&self, path: &str) -> RegResult<Vec<NodeHandle>> {
        let mut current: Vec<NodeHandle> = match self.handle() {
            Some(me) => vec![me],
            None => return Err(self.not_found(path)),
        };
        for section in path.split('.') {
            if section.trim().is_empty() {
                continue;
            }
            let mut next = vec![];
            for node in &current {
                if section == "*" {
                    next.extend(node.nodes());
                } else {
                    next.extend(node.node_match(section)?);
                }
            }
            current = next;
        }
        Ok(current)
    }

    /// Resolve a dotted path that must name exactly one node.
    pub fn get_node(&self, path: &str) -> RegResult<NodeHandle> {
        let mut nodes = self.get_nodes(path)?;
        if nodes.len() != 1 {
            return Err(RegError::InvalidExpression { expr: path.into() });
        }
        Ok(nodes.remove(0))
    }

    fn not_found(&self, name: &str) -> RegError {
        RegError::NotFound {
            path: self.path(),
            name: name.into(),
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match self.kind {
            NodeKind::Device(_) => "Device",
            NodeKind::Variable(_) => "Variable",
            NodeKind::Command(_) => "Command",
        };
        write!(f, "{}({})", kind, self.path())
    }
}

#[cfg(test)]
mod tests {
    use crate::{DeviceOptions, LocalVariableOptions, device::Device, variable::Variable};

    #[test]
    fn path_is_dot_joined() {
        let top = Device::create("top", DeviceOptions::default());
        let mid = Device::create("mid", DeviceOptions::default());
        let var = Variable::local("count", LocalVariableOptions::default());
        mid.add(var.clone()).unwrap();
        top.add(mid.clone()).unwrap();
        assert_eq!(var.path(), "top.mid.count");
        assert!(var.root().unwrap().ptr_eq(&top));
        assert!(var.parent_device().unwrap().ptr_eq(&mid));
    }

    #[test]
    fn reparenting_fails() {
        let a = Device::create("a", DeviceOptions::default());
        let b = Device::create("b", DeviceOptions::default());
        let var = Variable::local("v", LocalVariableOptions::default());
        a.add(var.clone()).unwrap();
        let err = b.add(var).unwrap_err();
        assert!(matches!(err, crate::RegError::AlreadyAttached { .. }));
    }
}
