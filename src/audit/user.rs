use chrono::{Local, NaiveDateTime};

/// The acting user recorded on each history entry.
pub trait UserContext: Send + Sync {
    fn user_name(&self) -> String;

    fn local_time(&self) -> NaiveDateTime;
}

/// A fixed user name, stamped with the local clock unless a time is pinned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticUser {
    name: String,
    pinned: Option<NaiveDateTime>,
}

impl StaticUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pinned: None,
        }
    }

    pub fn at(mut self, time: NaiveDateTime) -> Self {
        self.pinned = Some(time);
        self
    }
}

impl UserContext for StaticUser {
    fn user_name(&self) -> String {
        self.name.clone()
    }

    fn local_time(&self) -> NaiveDateTime {
        self.pinned.unwrap_or_else(|| Local::now().naive_local())
    }
}
