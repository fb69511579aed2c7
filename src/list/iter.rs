use super::List;
use crate::core::{Result, Value};
use std::iter::FusedIterator;

/// Cursor over a list's live contents.
///
/// Each step re-reads the live count and the element under the cursor, so
/// writes made while iterating are observed. The iteration never goes past
/// the count seen by the first step: elements appended while iterating are
/// not visited, and removing elements ends it early. An error ends the
/// iteration after being yielded once.
pub struct ListIter {
    list: List,
    next: usize,
    end: Option<usize>,
    done: bool,
}

impl ListIter {
    pub(crate) fn new(list: List) -> Self {
        Self {
            list,
            next: 0,
            end: None,
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<Value>> {
        let live = self.list.count()?;
        let end = *self.end.get_or_insert(live);
        if self.next >= end.min(live) {
            return Ok(None);
        }
        let value = self.list.get(self.next)?;
        self.next += 1;
        Ok(Some(value))
    }
}

impl Iterator for ListIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for ListIter {}

impl IntoIterator for &List {
    type Item = Result<Value>;
    type IntoIter = ListIter;

    fn into_iter(self) -> ListIter {
        ListIter::new(self.clone())
    }
}
