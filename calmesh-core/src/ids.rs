//! Injectable sync-group id source.

/// Generates fresh group identifiers. Injected so tests are deterministic.
pub trait GroupIdSource {
    fn next_id(&mut self) -> String;
}

/// Random UUID v4 ids, the production source.
pub struct UuidSource;

impl GroupIdSource for UuidSource {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Predictable `<prefix>-1`, `<prefix>-2`, ... ids, for tests.
pub struct SequentialIds {
    prefix: String,
    counter: u64,
}

impl SequentialIds {
    pub fn new(prefix: &str) -> SequentialIds {
        SequentialIds {
            prefix: prefix.to_string(),
            counter: 0,
        }
    }
}

impl GroupIdSource for SequentialIds {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{}", self.prefix, self.counter)
    }
}
