//! Minimal Newick reader and writer.

use super::{NodeId, Tree, TreeError};

impl Tree {
    /// Parse a single Newick tree. Labels may be quoted with `'`; bracketed
    /// comments are skipped.
    pub fn from_newick(input: &str) -> Result<Tree, TreeError> {
        let mut parser = Parser { input, pos: 0 };
        let mut tree = Tree::new("");
        let root = tree.root();

        parser.skip_ws()?;
        parser.subtree(&mut tree, root)?;
        parser.skip_ws()?;
        if parser.peek() != Some(b';') {
            return Err(parser.error("expected ';'"));
        }
        parser.pos += 1;
        parser.skip_ws()?;
        if parser.pos < input.len() {
            return Err(parser.error("trailing characters after ';'"));
        }
        tree.set_dist(root, 0.0);
        Ok(tree)
    }

    /// Serialize the tree, children in their stored order.
    pub fn to_newick(&self, with_dist: bool) -> String {
        let mut out = String::new();
        self.write_node(self.root(), with_dist, &mut out);
        out.push(';');
        out
    }

    fn write_node(&self, node: NodeId, with_dist: bool, out: &mut String) {
        let children = self.children(node);
        if !children.is_empty() {
            out.push('(');
            for (i, &child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_node(child, with_dist, out);
            }
            out.push(')');
        }
        out.push_str(&quote_label(self.name(node)));
        if with_dist && !self.is_root(node) {
            out.push(':');
            out.push_str(&self.dist(node).to_string());
        }
    }

    /// Order-independent topology string of the subtree under `node`, leaves
    /// rendered with `label`. Children are sorted by their own rendering, so
    /// two clades with the same labelled shape produce the same string.
    pub fn canonical_newick<F>(&self, node: NodeId, label: F) -> String
    where
        F: Fn(NodeId) -> String,
    {
        let mut out = self.canonical_node(node, &label);
        out.push(';');
        out
    }

    fn canonical_node<F>(&self, node: NodeId, label: &F) -> String
    where
        F: Fn(NodeId) -> String,
    {
        if self.is_leaf(node) {
            return quote_label(&label(node));
        }
        let mut parts: Vec<String> = self
            .children(node)
            .iter()
            .map(|&c| self.canonical_node(c, label))
            .collect();
        parts.sort();
        format!("({})", parts.join(","))
    }
}

fn quote_label(label: &str) -> String {
    let needs_quotes = label
        .chars()
        .any(|c| c.is_whitespace() || "(),:;[]'".contains(c));
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn error(&self, message: &str) -> TreeError {
        TreeError::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) -> Result<(), TreeError> {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'[' {
                match self.input[self.pos..].find(']') {
                    Some(end) => self.pos += end + 1,
                    None => return Err(self.error("unterminated comment")),
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn subtree(&mut self, tree: &mut Tree, node: NodeId) -> Result<(), TreeError> {
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                self.skip_ws()?;
                let child = tree.add_new_child(node, "");
                self.subtree(tree, child)?;
                self.skip_ws()?;
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
            self.skip_ws()?;
        }

        let label = self.label()?;
        tree.set_name(node, label);
        self.skip_ws()?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_ws()?;
            let dist = self.number()?;
            tree.set_dist(node, dist);
            self.skip_ws()?;
        }
        Ok(())
    }

    fn label(&mut self) -> Result<String, TreeError> {
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let mut out = String::new();
            loop {
                let rest = &self.input[self.pos..];
                let Some(end) = rest.find('\'') else {
                    return Err(self.error("unterminated quoted label"));
                };
                out.push_str(&rest[..end]);
                self.pos += end + 1;
                if self.peek() == Some(b'\'') {
                    out.push('\'');
                    self.pos += 1;
                } else {
                    return Ok(out);
                }
            }
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() || b"(),:;[]".contains(&c) {
                break;
            }
            self.pos += 1;
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<f64, TreeError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || b"+-.eE".contains(&c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| TreeError::Parse {
                position: start,
                message: "invalid branch length".to_string(),
            })
    }
}
