//! Array interception for store proxies.
//!
//! Mutators copy the raw array, apply the change to the copy and write the
//! copy back as an array mutation, so the differ can compare the old and new
//! arrays element by element. Iteration methods hand each element to the
//! callback as its own child proxy; reads made through it subscribe to that
//! element only.

use std::cmp::Ordering;
use std::ops::{Bound, Range, RangeBounds};

use serde::Serialize;
use serde_json::Value;

use super::diff::WriteKind;
use super::proxy::Proxy;
use crate::error::{ReactiveError, Result};

impl Proxy {
    /// Apply `f` to a copy of the raw array and write the copy back.
    pub(crate) fn mutate_array<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        let mut items = match self.raw_slice()? {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ReactiveError::NotAnArray {
                    path: self.path_string(),
                })
            }
        };
        let result = f(&mut items);
        self.write(Some(Value::Array(items)), WriteKind::ArrayMutation)?;
        Ok(result)
    }

    /// Append a value and return the new length.
    pub fn push<V: Serialize>(&self, value: V) -> Result<usize> {
        let value = serde_json::to_value(value)?;
        self.mutate_array(|items| {
            items.push(value);
            items.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.mutate_array(Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Value>> {
        self.mutate_array(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Prepend a value and return the new length.
    pub fn unshift<V: Serialize>(&self, value: V) -> Result<usize> {
        let value = serde_json::to_value(value)?;
        self.mutate_array(|items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Remove `delete_count` elements starting at `start`, insert `insert`
    /// in their place and return the removed elements.
    ///
    /// Both `start` and `delete_count` are clamped to the array.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        self.mutate_array(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Reverse the array in place.
    pub fn reverse(&self) -> Result<()> {
        self.mutate_array(|items| items.reverse())
    }

    /// Sort by each element's string form, the way untyped arrays sort by
    /// default. The sort is stable.
    pub fn sort(&self) -> Result<()> {
        self.mutate_array(|items| items.sort_by_cached_key(display_string))
    }

    /// Sort with a comparator. The sort is stable.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        self.mutate_array(|items| items.sort_by(compare))
    }

    /// Overwrite the elements in `range` with `value`.
    pub fn fill<V: Serialize>(&self, value: V, range: impl RangeBounds<usize>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.mutate_array(|items| {
            let range = clamp_range(&range, items.len());
            items[range].fill(value);
        })
    }

    /// Copy the elements in `range` to position `dest`, overwriting what is
    /// there. The array never grows.
    pub fn copy_within(&self, range: impl RangeBounds<usize>, dest: usize) -> Result<()> {
        self.mutate_array(|items| {
            let len = items.len();
            let src = clamp_range(&range, len);
            let dest = dest.min(len);
            let count = src.len().min(len.saturating_sub(dest));
            let chunk = items[src.start..src.start + count].to_vec();
            items[dest..dest + count].clone_from_slice(&chunk);
        })
    }

    /// Call `f` with every element's proxy.
    pub fn for_each(&self, mut f: impl FnMut(usize, Proxy)) -> Result<()> {
        for index in 0..self.len()? {
            f(index, self.try_at(index)?);
        }
        Ok(())
    }

    /// Collect `f` applied to every element's proxy.
    pub fn map<R>(&self, mut f: impl FnMut(usize, Proxy) -> R) -> Result<Vec<R>> {
        (0..self.len()?)
            .map(|index| Ok(f(index, self.try_at(index)?)))
            .collect()
    }

    /// The proxies of the elements for which `f` returns `true`.
    pub fn filter(&self, mut f: impl FnMut(usize, Proxy) -> bool) -> Result<Vec<Proxy>> {
        let mut kept = Vec::new();
        for index in 0..self.len()? {
            let element = self.try_at(index)?;
            if f(index, element) {
                kept.push(element);
            }
        }
        Ok(kept)
    }

    /// Whether `f` holds for every element. Stops at the first failure, so
    /// later elements are not read.
    pub fn every(&self, mut f: impl FnMut(usize, Proxy) -> bool) -> Result<bool> {
        for index in 0..self.len()? {
            if !f(index, self.try_at(index)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `f` holds for some element. Stops at the first match.
    pub fn some(&self, mut f: impl FnMut(usize, Proxy) -> bool) -> Result<bool> {
        for index in 0..self.len()? {
            if f(index, self.try_at(index)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Join the elements' string forms with `separator`. Each element is a
    /// tracked read; `null` joins as an empty string.
    pub fn join(&self, separator: &str) -> Result<String> {
        let parts = self.map(|_, element| match element.try_get() {
            Ok(Some(Value::Null) | None) => Ok(String::new()),
            Ok(Some(value)) => Ok(display_string(&value)),
            Err(err) => Err(err),
        })?;
        Ok(parts.into_iter().collect::<Result<Vec<_>>>()?.join(separator))
    }
}

/// String form used by `sort` and `join`.
fn display_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match (number.as_i64(), number.as_u64(), number.as_f64()) {
            (Some(int), _, _) => int.to_string(),
            (_, Some(uint), _) => uint.to_string(),
            (_, _, Some(float)) => float.to_string(),
            _ => number.to_string(),
        },
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                item => display_string(item),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

fn clamp_range(range: &impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end.saturating_add(1),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    start.min(end)..end
}
