use std::cmp::Ordering;
use std::collections::btree_map;
use std::iter::Peekable;

use super::TableSnapshot;
use crate::types::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Added,
    Removed,
    Modified,
}

impl RowChange {
    pub fn as_str(self) -> &'static str {
        match self {
            RowChange::Added => "added",
            RowChange::Removed => "removed",
            RowChange::Modified => "modified",
        }
    }
}

/// One changed row. `from` is absent for added rows and `to` for removed ones.
#[derive(Debug, Clone, Copy)]
pub struct RowDiff<'a> {
    pub change: RowChange,
    pub from: Option<&'a Row>,
    pub to: Option<&'a Row>,
}

type Rows<'a> = Peekable<btree_map::Iter<'a, Vec<Value>, Row>>;

/// Merge-joins two snapshots on primary key, yielding only changed rows.
pub struct RowDiffIter<'a> {
    from: Option<Rows<'a>>,
    to: Option<Rows<'a>>,
}

/// Lazily diffs the rows of two versions of a table. A missing side counts as
/// an empty table.
pub fn diff_rows<'a>(from: Option<&'a TableSnapshot>, to: Option<&'a TableSnapshot>) -> RowDiffIter<'a> {
    RowDiffIter {
        from: from.map(|t| t.rows.iter().peekable()),
        to: to.map(|t| t.rows.iter().peekable()),
    }
}

impl<'a> Iterator for RowDiffIter<'a> {
    type Item = RowDiff<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let from_key = self.from.as_mut().and_then(|it| it.peek().map(|(k, _)| *k));
            let to_key = self.to.as_mut().and_then(|it| it.peek().map(|(k, _)| *k));

            let order = match (from_key, to_key) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(f), Some(t)) => f.cmp(t),
            };

            match order {
                Ordering::Less => {
                    let (_, row) = self.from.as_mut()?.next()?;
                    return Some(RowDiff {
                        change: RowChange::Removed,
                        from: Some(row),
                        to: None,
                    });
                }
                Ordering::Greater => {
                    let (_, row) = self.to.as_mut()?.next()?;
                    return Some(RowDiff {
                        change: RowChange::Added,
                        from: None,
                        to: Some(row),
                    });
                }
                Ordering::Equal => {
                    let (_, from_row) = self.from.as_mut()?.next()?;
                    let (_, to_row) = self.to.as_mut()?.next()?;
                    if from_row != to_row {
                        return Some(RowDiff {
                            change: RowChange::Modified,
                            from: Some(from_row),
                            to: Some(to_row),
                        });
                    }
                }
            }
        }
    }
}
