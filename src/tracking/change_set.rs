use crate::core::Value;

/// A single column whose value differs from its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub column: String,
    pub old: Value,
    pub new: Value,
}

/// Columns changed since a snapshot, in metadata order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change; a later entry for the same column replaces the new value
    /// and keeps the original old value.
    pub fn push(&mut self, column: impl Into<String>, old: Value, new: Value) {
        let column = column.into();
        match self.changes.iter_mut().find(|c| c.column == column) {
            Some(existing) => existing.new = new,
            None => self.changes.push(Change { column, old, new }),
        }
    }

    pub fn with_change(mut self, column: impl Into<String>, old: Value, new: Value) -> Self {
        self.push(column, old, new);
        self
    }

    pub fn contains(&self, column: &str) -> bool {
        self.changes.iter().any(|c| c.column == column)
    }

    pub fn get(&self, column: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.column == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.column.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
