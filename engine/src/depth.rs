use std::collections::HashMap;

use crate::tree::SkillNode;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done(u32),
}

/// Dependency depth (tier) of every node: 0 without requirements, otherwise one more than the
/// deepest requirement.
pub struct DepthResolver<'a> {
    nodes: HashMap<&'a str, &'a SkillNode>,
    order: Vec<&'a str>,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a str>,
}

impl<'a> DepthResolver<'a> {
    pub fn new(nodes: &'a [SkillNode]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            order: nodes.iter().map(|n| n.id.as_str()).collect(),
            marks: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Resolves every node. On a cycle, returns the offending path (first id repeated at the end).
    pub fn resolve_all(mut self) -> Result<HashMap<String, u32>, Vec<String>> {
        let order = std::mem::take(&mut self.order);
        for id in order {
            self.depth(id)?;
        }
        Ok(self
            .marks
            .into_iter()
            .filter_map(|(id, mark)| match mark {
                Mark::Done(d) => Some((id.to_string(), d)),
                Mark::InProgress => None,
            })
            .collect())
    }

    fn depth(&mut self, id: &'a str) -> Result<u32, Vec<String>> {
        match self.marks.get(id) {
            Some(Mark::Done(d)) => return Ok(*d),
            Some(Mark::InProgress) => {
                let start = self.stack.iter().position(|x| *x == id).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(id.to_string());
                return Err(cycle);
            }
            None => {}
        }

        // Unknown ids never reach here after validation; treat them as roots regardless.
        let Some(node) = self.nodes.get(id).copied() else {
            return Ok(0);
        };
        if node.requires.is_empty() {
            self.marks.insert(id, Mark::Done(0));
            return Ok(0);
        }

        self.marks.insert(id, Mark::InProgress);
        self.stack.push(id);
        let mut deepest = 0;
        for req in &node.requires {
            deepest = deepest.max(self.depth(req.as_str())?);
        }
        self.stack.pop();

        let depth = deepest + 1;
        self.marks.insert(id, Mark::Done(depth));
        Ok(depth)
    }
}
