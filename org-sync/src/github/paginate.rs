//! Walks a two level paginated collection (for example teams, then the
//! members of each team).
//!
//! The inner cursor of a nested query applies to every node of the outer
//! page, so continuing an inner collection means fetching the outer page
//! again from the same outer cursor. The result set is live: the node being
//! continued is looked up again by its id, never by its position.

use crate::github::api::Page;
use anyhow::anyhow;
use log::trace;

/// An outer node carrying one page of an inner collection.
pub(crate) trait Nested {
    type Item;

    fn node_id(&self) -> &str;

    /// Takes the inner page out of the node.
    fn take_inner(&mut self) -> Page<Self::Item>;
}

enum Step<N> {
    /// Fetch the outer page starting at `cursor`.
    Outer { cursor: Option<String> },
    /// Visit the node at `index` of `page`.
    Node {
        cursor: Option<String>,
        page: Page<N>,
        index: usize,
    },
    /// Fetch the outer page at `cursor` again, continuing the inner
    /// collection of the node at `index` from `inner_cursor`.
    Requery {
        cursor: Option<String>,
        page: Page<N>,
        index: usize,
        inner_cursor: String,
    },
    Done,
}

/// Calls `visit` with every node and each page of its inner collection.
///
/// `fetch(outer_cursor, inner_cursor)` returns one outer page whose nodes
/// carry the inner page starting at `inner_cursor`. A node may be visited
/// several times, once per inner page.
pub(crate) fn walk_nested<N, F, V>(mut fetch: F, mut visit: V) -> anyhow::Result<()>
where
    N: Nested,
    F: FnMut(Option<&str>, Option<&str>) -> anyhow::Result<Page<N>>,
    V: FnMut(&N, Vec<N::Item>) -> anyhow::Result<()>,
{
    let mut step = Step::Outer { cursor: None };
    loop {
        step = match step {
            Step::Outer { cursor } => {
                trace!("fetching outer page at {cursor:?}");
                let page = fetch(cursor.as_deref(), None)?;
                Step::Node {
                    cursor,
                    page,
                    index: 0,
                }
            }
            Step::Node {
                cursor,
                mut page,
                index,
            } => {
                if let Some(node) = page.nodes.get_mut(index) {
                    let inner = node.take_inner();
                    visit(node, inner.nodes)?;
                    continue_inner(cursor, page, index, inner.has_next_page, inner.end_cursor)
                } else if page.has_next_page && page.end_cursor.is_some() {
                    Step::Outer {
                        cursor: page.end_cursor,
                    }
                } else {
                    Step::Done
                }
            }
            Step::Requery {
                cursor,
                page,
                index,
                inner_cursor,
            } => {
                let id = match page.nodes.get(index) {
                    Some(node) => node.node_id().to_string(),
                    None => return Err(anyhow!("lost track of node {index} while paginating")),
                };
                trace!("fetching outer page at {cursor:?} again to continue {id} at {inner_cursor}");
                let refreshed = fetch(cursor.as_deref(), Some(&inner_cursor))?;
                let mut node = refreshed
                    .nodes
                    .into_iter()
                    .find(|node| node.node_id() == id)
                    .ok_or_else(|| anyhow!("{id} disappeared from the results while paginating"))?;
                let inner = node.take_inner();
                visit(&node, inner.nodes)?;
                continue_inner(cursor, page, index, inner.has_next_page, inner.end_cursor)
            }
            Step::Done => return Ok(()),
        };
    }
}

fn continue_inner<N>(
    cursor: Option<String>,
    page: Page<N>,
    index: usize,
    has_next_page: bool,
    end_cursor: Option<String>,
) -> Step<N> {
    match end_cursor {
        Some(inner_cursor) if has_next_page => Step::Requery {
            cursor,
            page,
            index,
            inner_cursor,
        },
        _ => Step::Node {
            cursor,
            page,
            index: index + 1,
        },
    }
}

/// Collects every node of a flat paginated collection.
pub(crate) fn walk_flat<T, F>(mut fetch: F) -> anyhow::Result<Vec<T>>
where
    F: FnMut(Option<&str>) -> anyhow::Result<Page<T>>,
{
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(cursor.as_deref())?;
        all.extend(page.nodes);
        match page.end_cursor {
            Some(next) if page.has_next_page => cursor = Some(next),
            _ => return Ok(all),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Debug)]
    struct Node {
        id: String,
        items: Page<u32>,
    }

    impl Nested for Node {
        type Item = u32;

        fn node_id(&self) -> &str {
            &self.id
        }

        fn take_inner(&mut self) -> Page<u32> {
            std::mem::take(&mut self.items)
        }
    }

    /// Outer pages of two nodes, inner pages of two items; cursors are
    /// offsets. `order` decides the order of the outer collection.
    fn page(order: &[(&str, Vec<u32>)], cursor: Option<&str>, inner: Option<&str>) -> Page<Node> {
        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let inner_start: usize = inner.map_or(0, |c| c.parse().unwrap());
        let nodes: Vec<Node> = order
            .iter()
            .skip(start)
            .take(2)
            .map(|(id, items)| {
                let inner_end = (inner_start + 2).min(items.len());
                Node {
                    id: id.to_string(),
                    items: Page {
                        nodes: items[inner_start.min(items.len())..inner_end].to_vec(),
                        end_cursor: Some(inner_end.to_string()),
                        has_next_page: inner_end < items.len(),
                    },
                }
            })
            .collect();
        let end = start + nodes.len();
        Page {
            nodes,
            end_cursor: Some(end.to_string()),
            has_next_page: end < order.len(),
        }
    }

    #[test]
    fn requeries_and_relocates_by_id() {
        let initial = vec![
            ("a", vec![1]),
            ("b", vec![2, 3, 4, 5, 6]),
            ("c", vec![7]),
        ];
        // After the first fetch, "b" moves to the front of the collection.
        let shuffled = vec![
            ("b", vec![2, 3, 4, 5, 6]),
            ("a", vec![1]),
            ("c", vec![7]),
        ];
        let calls = RefCell::new(Vec::new());
        let mut seen: Vec<(String, Vec<u32>)> = Vec::new();
        walk_nested(
            |cursor, inner| {
                calls
                    .borrow_mut()
                    .push((cursor.map(str::to_string), inner.map(str::to_string)));
                let order = if calls.borrow().len() == 1 { &initial } else { &shuffled };
                Ok(page(order, cursor, inner))
            },
            |node: &Node, items| {
                seen.push((node.id.clone(), items));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("a".to_string(), vec![1]),
                ("b".to_string(), vec![2, 3]),
                ("b".to_string(), vec![4, 5]),
                ("b".to_string(), vec![6]),
                ("c".to_string(), vec![7]),
            ]
        );
        assert_eq!(
            calls.into_inner(),
            vec![
                (None, None),
                (None, Some("2".to_string())),
                (None, Some("4".to_string())),
                (Some("2".to_string()), None),
            ]
        );
    }

    #[test]
    fn missing_node_on_requery_is_an_error() {
        let initial = vec![("a", vec![1, 2, 3])];
        let mut calls = 0;
        let result = walk_nested(
            |cursor, inner| {
                calls += 1;
                if calls == 1 {
                    Ok(page(&initial, cursor, inner))
                } else {
                    Ok(page(&[], cursor, inner))
                }
            },
            |_: &Node, _| Ok(()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn flat_walk_follows_cursors() {
        let items: Vec<u32> = (0..5).collect();
        let all = walk_flat(|cursor| {
            let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
            let end = (start + 2).min(items.len());
            Ok(Page {
                nodes: items[start..end].to_vec(),
                end_cursor: Some(end.to_string()),
                has_next_page: end < items.len(),
            })
        })
        .unwrap();
        assert_eq!(all, items);
    }
}
