use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A top-level entry of a question hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HierarchyNode {
    Question {
        id: String,
    },
    QuestionGroup {
        id: String,
        #[serde(default)]
        children_ids: Vec<String>,
    },
}

impl HierarchyNode {
    pub fn question(id: impl Into<String>) -> Self {
        HierarchyNode::Question { id: id.into() }
    }

    pub fn group<I, S>(id: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HierarchyNode::QuestionGroup {
            id: id.into(),
            children_ids: children.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("question {0} appears more than once in the hierarchy")]
    DuplicateQuestion(String),
    #[error("group {0} appears more than once in the hierarchy")]
    DuplicateGroup(String),
    #[error("hierarchy node has an empty id")]
    EmptyId,
}

/// Ordered two-level tree of questions and question groups.
///
/// Every question id appears at most once across the whole tree. Values are
/// immutable: every operation returns a new hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<HierarchyNode>", into = "Vec<HierarchyNode>")]
pub struct QuestionHierarchy {
    nodes: Vec<HierarchyNode>,
}

impl QuestionHierarchy {
    pub fn new(nodes: Vec<HierarchyNode>) -> Result<Self, HierarchyError> {
        let mut questions = HashSet::new();
        let mut groups = HashSet::new();
        for node in &nodes {
            match node {
                HierarchyNode::Question { id } => {
                    if id.is_empty() {
                        return Err(HierarchyError::EmptyId);
                    }
                    if !questions.insert(id.as_str()) {
                        return Err(HierarchyError::DuplicateQuestion(id.clone()));
                    }
                }
                HierarchyNode::QuestionGroup { id, children_ids } => {
                    if id.is_empty() {
                        return Err(HierarchyError::EmptyId);
                    }
                    if !groups.insert(id.as_str()) {
                        return Err(HierarchyError::DuplicateGroup(id.clone()));
                    }
                    for child in children_ids {
                        if child.is_empty() {
                            return Err(HierarchyError::EmptyId);
                        }
                        if !questions.insert(child.as_str()) {
                            return Err(HierarchyError::DuplicateQuestion(child.clone()));
                        }
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Builds a flat hierarchy with one question node per id.
    pub fn from_question_ids<I, S>(ids: I) -> Result<Self, HierarchyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(HierarchyNode::question).collect())
    }

    pub fn nodes(&self) -> &[HierarchyNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the hierarchy holds no question at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            HierarchyNode::Question { .. } => false,
            HierarchyNode::QuestionGroup { children_ids, .. } => children_ids.is_empty(),
        })
    }

    /// Question ids in display order: top-level nodes in order, group
    /// children expanded in place.
    pub fn flatten(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for node in &self.nodes {
            match node {
                HierarchyNode::Question { id } => ids.push(id.clone()),
                HierarchyNode::QuestionGroup { children_ids, .. } => {
                    ids.extend(children_ids.iter().cloned())
                }
            }
        }
        ids
    }

    /// Drops the given question ids, preserving relative order. Groups left
    /// without children are dropped as well.
    pub fn exclude<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        let excluded: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        let nodes = self
            .nodes
            .iter()
            .filter_map(|node| match node {
                HierarchyNode::Question { id } => {
                    (!excluded.contains(id.as_str())).then(|| node.clone())
                }
                HierarchyNode::QuestionGroup { id, children_ids } => {
                    let kept: Vec<String> = children_ids
                        .iter()
                        .filter(|child| !excluded.contains(child.as_str()))
                        .cloned()
                        .collect();
                    (!kept.is_empty()).then(|| HierarchyNode::QuestionGroup {
                        id: id.clone(),
                        children_ids: kept,
                    })
                }
            })
            .collect();
        Self { nodes }
    }

    /// Keeps only the given question ids. The inverse view of `exclude`.
    pub fn retain<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        let kept: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        let dropped: Vec<String> = self
            .flatten()
            .into_iter()
            .filter(|id| !kept.contains(id.as_str()))
            .collect();
        self.exclude(&dropped)
    }

    /// Ids of the group nodes, in order.
    pub fn group_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                HierarchyNode::QuestionGroup { id, .. } => Some(id.clone()),
                HierarchyNode::Question { .. } => None,
            })
            .collect()
    }

    /// Reorders the top-level nodes by `permutation`, where position `d` of
    /// the result holds node `permutation[d]`.
    pub(crate) fn permuted(&self, permutation: &[usize]) -> Self {
        debug_assert_eq!(permutation.len(), self.nodes.len());
        Self {
            nodes: permutation.iter().map(|&i| self.nodes[i].clone()).collect(),
        }
    }
}

impl TryFrom<Vec<HierarchyNode>> for QuestionHierarchy {
    type Error = HierarchyError;

    fn try_from(nodes: Vec<HierarchyNode>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

impl From<QuestionHierarchy> for Vec<HierarchyNode> {
    fn from(hierarchy: QuestionHierarchy) -> Self {
        hierarchy.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> QuestionHierarchy {
        QuestionHierarchy::new(vec![
            HierarchyNode::question("q1"),
            HierarchyNode::group("g1", ["q2", "q3"]),
            HierarchyNode::question("q4"),
        ])
        .unwrap()
    }

    #[test]
    fn flatten_expands_groups_in_place() {
        assert_eq!(sample().flatten(), vec!["q1", "q2", "q3", "q4"]);
    }

    #[test]
    fn exclude_keeps_group_with_remaining_children() {
        let reduced = sample().exclude(&["q2", "q4"]);
        assert_eq!(
            reduced.nodes(),
            &[
                HierarchyNode::question("q1"),
                HierarchyNode::group("g1", ["q3"]),
            ]
        );
    }

    #[test]
    fn exclude_drops_emptied_group() {
        let reduced = sample().exclude(&["q2", "q3"]);
        assert_eq!(reduced.flatten(), vec!["q1", "q4"]);
        assert!(reduced.group_ids().is_empty());
    }

    #[test]
    fn exclude_drops_groups_that_were_already_empty() {
        let hierarchy = QuestionHierarchy::new(vec![
            HierarchyNode::group("empty", Vec::<String>::new()),
            HierarchyNode::question("q1"),
        ])
        .unwrap();
        assert!(hierarchy.exclude::<&str>(&[]).group_ids().is_empty());
    }

    #[test]
    fn exclude_everything_leaves_empty_hierarchy() {
        let reduced = sample().exclude(&["q1", "q2", "q3", "q4"]);
        assert!(reduced.is_empty());
        assert_eq!(reduced.len(), 0);
    }

    #[test]
    fn retain_keeps_only_listed_questions() {
        let page = sample().retain(&["q3", "q4"]);
        assert_eq!(page.flatten(), vec!["q3", "q4"]);
        assert_eq!(page.group_ids(), vec!["g1"]);
    }

    #[test]
    fn rejects_duplicate_question_across_group_and_top_level() {
        let err = QuestionHierarchy::new(vec![
            HierarchyNode::question("q1"),
            HierarchyNode::group("g1", ["q1"]),
        ])
        .unwrap_err();
        assert_eq!(err, HierarchyError::DuplicateQuestion("q1".to_string()));
    }

    #[test]
    fn rejects_duplicate_group() {
        let err = QuestionHierarchy::new(vec![
            HierarchyNode::group("g1", ["q1"]),
            HierarchyNode::group("g1", ["q2"]),
        ])
        .unwrap_err();
        assert_eq!(err, HierarchyError::DuplicateGroup("g1".to_string()));
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"[{"type":"question","id":"q1"},{"type":"question","id":"q1"}]"#;
        assert!(serde_json::from_str::<QuestionHierarchy>(json).is_err());

        let json = r#"[{"type":"question","id":"q1"},{"type":"question_group","id":"g","children_ids":["q2"]}]"#;
        let hierarchy: QuestionHierarchy = serde_json::from_str(json).unwrap();
        assert_eq!(hierarchy.flatten(), vec!["q1", "q2"]);
    }

    /// `None` is a top-level question, `Some(n)` a group with `n` children.
    fn build(shape: &[Option<usize>]) -> QuestionHierarchy {
        let mut next = 0;
        let mut fresh = || {
            next += 1;
            format!("q{}", next)
        };
        let nodes = shape
            .iter()
            .enumerate()
            .map(|(i, node)| match node {
                None => HierarchyNode::question(fresh()),
                Some(n) => HierarchyNode::group(
                    format!("g{}", i),
                    (0..*n).map(|_| fresh()).collect::<Vec<_>>(),
                ),
            })
            .collect();
        QuestionHierarchy::new(nodes).unwrap()
    }

    proptest! {
        #[test]
        fn exclude_removes_exactly_the_excluded_ids(
            shape in prop::collection::vec(prop::option::of(0usize..4), 0..8),
            mask in prop::collection::vec(any::<bool>(), 32),
        ) {
            let hierarchy = build(&shape);
            let all = hierarchy.flatten();
            let excluded: Vec<String> = all
                .iter()
                .zip(&mask)
                .filter(|(_, drop)| **drop)
                .map(|(id, _)| id.clone())
                .collect();

            let reduced = hierarchy.exclude(&excluded);

            let expected: Vec<String> = all
                .into_iter()
                .filter(|id| !excluded.contains(id))
                .collect();
            prop_assert_eq!(reduced.flatten(), expected);
            for node in reduced.nodes() {
                if let HierarchyNode::QuestionGroup { children_ids, .. } = node {
                    prop_assert!(!children_ids.is_empty());
                }
            }
        }
    }
}
