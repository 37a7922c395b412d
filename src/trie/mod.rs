use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A trie node. Nodes are immutable once published: edits clone the nodes
/// on the affected path and share everything else by reference.
#[derive(Clone, Default)]
struct TrieNode {
    children: HashMap<u8, Arc<TrieNode>>,
    // A Some value marks the node as terminal for some key. Values are
    // type-erased; retrieval matches on the runtime type.
    value: Option<Arc<dyn Any + Send + Sync>>,
}

/// A persistent map from byte strings to typed values. Every edit returns
/// a new `Trie`; the original and all earlier versions stay valid and
/// unchanged, sharing all untouched subtrees.
#[derive(Clone, Default)]
pub struct Trie {
    root: Option<Arc<TrieNode>>,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`, returning the stored value if the terminal node
    /// holds one of type `T`. A missing path, a routing-only terminal, or
    /// a stored value of a different type all yield `None`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        let mut curr = self.root.as_ref()?;
        for b in key.bytes() {
            curr = curr.children.get(&b)?;
        }
        curr.value.as_ref()?.downcast_ref::<T>()
    }

    /// Returns a new trie in which `key` maps to `value`. Only the nodes
    /// on the path from the root to the terminal are cloned; an existing
    /// terminal keeps its children.
    pub fn put<T: Send + Sync + 'static>(&self, key: &str, value: T) -> Trie {
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        Trie {
            root: Some(Arc::new(Self::put_path(
                self.root.as_ref(),
                key.as_bytes(),
                value,
            ))),
        }
    }

    fn put_path(
        node: Option<&Arc<TrieNode>>,
        key: &[u8],
        value: Arc<dyn Any + Send + Sync>,
    ) -> TrieNode {
        match key.split_first() {
            None => TrieNode {
                // the replacement terminal keeps the prior node's children
                children: node.map(|n| n.children.clone()).unwrap_or_default(),
                value: Some(value),
            },
            Some((&b, rest)) => {
                let mut cloned = node.map(|n| (**n).clone()).unwrap_or_default();
                let child = cloned.children.get(&b).cloned();
                let new_child = Self::put_path(child.as_ref(), rest, value);
                cloned.children.insert(b, Arc::new(new_child));
                cloned
            }
        }
    }

    /// Returns a new trie with `key` unbound. If the key is absent the
    /// original trie is returned unchanged (sharing the same root).
    /// Ancestors left with no value and no remaining children are dropped
    /// with it, so removing the last key yields an empty trie.
    pub fn remove(&self, key: &str) -> Trie {
        let Some(root) = &self.root else {
            return self.clone();
        };
        let bytes = key.as_bytes();

        let mut path: Vec<Arc<TrieNode>> = Vec::with_capacity(bytes.len() + 1);
        path.push(root.clone());
        for &b in bytes {
            let next = match path.last().and_then(|n| n.children.get(&b)) {
                Some(child) => child.clone(),
                None => return self.clone(),
            };
            path.push(next);
        }

        // path holds at least the root
        let terminal = path.pop().unwrap();
        if terminal.value.is_none() {
            // the path exists but no value is bound here
            return self.clone();
        }

        let mut replacement: Option<Arc<TrieNode>> = if terminal.children.is_empty() {
            None
        } else {
            // demote to a routing node, keeping the children
            Some(Arc::new(TrieNode {
                children: terminal.children.clone(),
                value: None,
            }))
        };

        if replacement.is_none() {
            // drop every ancestor that would be left childless and valueless
            while let Some(parent) = path.last() {
                if parent.value.is_some() || parent.children.len() > 1 {
                    break;
                }
                path.pop();
            }
        }

        // rebuild the surviving prefix bottom-up, cloning each ancestor
        while let Some(node) = path.pop() {
            let edge = bytes[path.len()];
            let mut cloned = (*node).clone();
            match &replacement {
                Some(child) => {
                    cloned.children.insert(edge, child.clone());
                }
                None => {
                    cloned.children.remove(&edge);
                }
            }
            replacement = Some(Arc::new(cloned));
        }

        Trie { root: replacement }
    }

    /// True when the trie holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}
