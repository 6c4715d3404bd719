// Queue Router - command name -> queue name (many-to-one)

use crate::domain::{CommandName, QueueName};
use std::collections::HashMap;

/// Routing rule used by the enqueuer
///
/// Explicit routes win. Any other command goes to the kebab-case form of its
/// StudlyCase name (`RentMovie` -> `rent-movie`).
#[derive(Debug, Clone, Default)]
pub struct QueueRouter {
    routes: HashMap<CommandName, QueueName>,
}

impl QueueRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `add`
    pub fn route(mut self, command: impl Into<String>, queue: impl Into<String>) -> Self {
        self.add(command, queue);
        self
    }

    pub fn add(&mut self, command: impl Into<String>, queue: impl Into<String>) {
        self.routes.insert(command.into(), queue.into());
    }

    pub fn queue_for(&self, command: &str) -> QueueName {
        self.routes
            .get(command)
            .cloned()
            .unwrap_or_else(|| kebab_case(command))
    }

    /// Distinct queues named by explicit routes, sorted
    pub fn queues(&self) -> Vec<QueueName> {
        let mut queues: Vec<QueueName> = self.routes.values().cloned().collect();
        queues.sort();
        queues.dedup();
        queues
    }
}

/// `RentMovie` -> `rent-movie`, `HTTPCall` -> `http-call`
pub fn kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("RentMovie"), "rent-movie");
        assert_eq!(kebab_case("HTTPCall"), "http-call");
        assert_eq!(kebab_case("Sync2Disk"), "sync2-disk");
        assert_eq!(kebab_case("ping"), "ping");
    }

    #[test]
    fn test_explicit_route_wins() {
        let router = QueueRouter::new()
            .route("RentMovie", "movies")
            .route("ReturnMovie", "movies");

        assert_eq!(router.queue_for("RentMovie"), "movies");
        assert_eq!(router.queue_for("ReturnMovie"), "movies");
        assert_eq!(router.queue_for("BuyMovie"), "buy-movie");
        assert_eq!(router.queues(), vec!["movies"]);
    }
}
