/// Arena-backed prefix tree. Node 0 is the root; children are kept sorted
/// by `char`, so a preorder walk yields terms in code point order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trie {
    pub(crate) nodes: Vec<Node>,
    pub(crate) len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) terminal: bool,
    pub(crate) children: Vec<(char, u32)>,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            len: 0,
        }
    }

    /// Number of distinct terms
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` when the term was not present before
    pub fn insert(&mut self, term: &str) -> bool {
        let mut node = 0usize;
        for ch in term.chars() {
            node = match self.nodes[node]
                .children
                .binary_search_by_key(&ch, |(c, _)| *c)
            {
                Ok(pos) => self.nodes[node].children[pos].1 as usize,
                Err(pos) => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(pos, (ch, child as u32));
                    child
                }
            };
        }

        let fresh = !self.nodes[node].terminal;
        if fresh {
            self.nodes[node].terminal = true;
            self.len += 1;
        }
        fresh
    }

    pub fn contains(&self, term: &str) -> bool {
        self.descend(term)
            .is_some_and(|node| self.nodes[node].terminal)
    }

    /// Terms starting with `query` in lexicographic order, at most `limit`
    /// of them. A negative `limit` means no limit.
    pub fn search_prefix(&self, query: &str, limit: i64) -> Vec<String> {
        let cap = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut results = Vec::new();
        if cap == 0 {
            return results;
        }
        let Some(start) = self.descend(query) else {
            return results;
        };

        let mut path = query.to_string();
        if self.nodes[start].terminal {
            results.push(path.clone());
        }

        // (node, next child to visit)
        let mut stack = vec![(start, 0usize)];
        while results.len() < cap {
            let Some(&(node, next)) = stack.last() else {
                break;
            };
            let children = &self.nodes[node].children;
            if let Some(&(ch, child)) = children.get(next) {
                let top = stack.len() - 1;
                stack[top].1 += 1;

                let child = child as usize;
                path.push(ch);
                if self.nodes[child].terminal {
                    results.push(path.clone());
                }
                stack.push((child, 0));
            } else {
                stack.pop();
                if !stack.is_empty() {
                    path.pop();
                }
            }
        }
        results
    }

    fn descend(&self, prefix: &str) -> Option<usize> {
        let mut node = 0usize;
        for ch in prefix.chars() {
            let children = &self.nodes[node].children;
            let pos = children.binary_search_by_key(&ch, |(c, _)| *c).ok()?;
            node = children[pos].1 as usize;
        }
        Some(node)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Trie {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for term in iter {
            trie.insert(term.as_ref());
        }
        trie
    }
}
