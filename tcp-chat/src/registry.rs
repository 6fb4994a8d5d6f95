use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;

use crate::{
    connection::{ConnectionHandle, ConnectionId},
    error::RegisterError,
};

/// Who is connected, and under which name.
///
/// Every mutation and every recipient snapshot goes through the same lock, so
/// a broadcast never observes a half-applied register or unregister. Entries
/// are keyed by monotonically increasing ids, which keeps iteration close to
/// registration order.
pub struct ConnectionRegistry {
    entries: Mutex<BTreeMap<ConnectionId, RegistryEntry>>,
    next_id: AtomicU64,
}

struct RegistryEntry {
    connection: ConnectionHandle,
    username: String,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Binds `connection` to `username` if nobody currently holds that name.
    ///
    /// Names compare exactly (case-sensitive, no trimming).
    pub async fn register(
        &self,
        connection: ConnectionHandle,
        username: &str,
    ) -> Result<(), RegisterError> {
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(&connection.id()) {
            return Err(RegisterError::AlreadyRegistered(existing.username.clone()));
        }
        if entries.values().any(|entry| entry.username == username) {
            return Err(RegisterError::UsernameTaken(username.to_string()));
        }

        entries.insert(
            connection.id(),
            RegistryEntry {
                connection,
                username: username.to_string(),
            },
        );
        Ok(())
    }

    pub async fn is_registered(&self, id: ConnectionId) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    pub async fn username_of(&self, id: ConnectionId) -> Option<String> {
        self.entries
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.username.clone())
    }

    /// Removes the entry for `id`, returning the name it held. No-op if absent.
    pub async fn unregister(&self, id: ConnectionId) -> Option<String> {
        self.entries
            .lock()
            .await
            .remove(&id)
            .map(|entry| entry.username)
    }

    /// Snapshot of every registered connection except `excluding`.
    pub async fn all_other_connections(&self, excluding: ConnectionId) -> Vec<ConnectionHandle> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(id, _)| **id != excluding)
            .map(|(_, entry)| entry.connection.clone())
            .collect()
    }

    pub async fn usernames(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .values()
            .map(|entry| entry.username.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use tokio::sync::mpsc;

    use super::*;

    fn connection(registry: &ConnectionRegistry) -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = "127.0.0.1:5000".parse().expect("valid addr");
        ConnectionHandle::new(registry.next_id(), peer, tx)
    }

    #[tokio::test]
    async fn rejects_duplicate_usernames() {
        let registry = ConnectionRegistry::new();
        let alice = connection(&registry);
        let impostor = connection(&registry);

        registry
            .register(alice.clone(), "alice")
            .await
            .expect("first registration should pass");
        let result = registry.register(impostor.clone(), "alice").await;

        assert_eq!(result, Err(RegisterError::UsernameTaken("alice".into())));
        assert!(!registry.is_registered(impostor.id()).await);
        assert_eq!(registry.usernames().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let registry = ConnectionRegistry::new();
        registry
            .register(connection(&registry), "alice")
            .await
            .expect("lowercase");
        registry
            .register(connection(&registry), "Alice")
            .await
            .expect("different case is a different name");
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn a_connection_registers_once() {
        let registry = ConnectionRegistry::new();
        let alice = connection(&registry);

        registry.register(alice.clone(), "alice").await.expect("register");
        let again = registry.register(alice.clone(), "alicia").await;

        assert_eq!(again, Err(RegisterError::AlreadyRegistered("alice".into())));
        assert_eq!(registry.username_of(alice.id()).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn released_names_are_immediately_reusable() {
        let registry = ConnectionRegistry::new();
        let first = connection(&registry);
        let second = connection(&registry);

        registry.register(first.clone(), "bob").await.expect("register");
        assert_eq!(registry.unregister(first.id()).await.as_deref(), Some("bob"));
        assert_eq!(registry.unregister(first.id()).await, None);

        registry
            .register(second.clone(), "bob")
            .await
            .expect("name should be free again");
        assert_eq!(registry.username_of(second.id()).await.as_deref(), Some("bob"));
        assert_eq!(registry.username_of(first.id()).await, None);
    }

    #[tokio::test]
    async fn snapshot_excludes_the_given_connection() {
        let registry = ConnectionRegistry::new();
        let alice = connection(&registry);
        let bob = connection(&registry);
        let carol = connection(&registry);
        let lurker = connection(&registry);

        for (conn, name) in [(&alice, "alice"), (&bob, "bob"), (&carol, "carol")] {
            registry.register(conn.clone(), name).await.expect("register");
        }

        let others: Vec<_> = registry
            .all_other_connections(alice.id())
            .await
            .iter()
            .map(ConnectionHandle::id)
            .collect();
        assert_eq!(others, vec![bob.id(), carol.id()]);
        assert!(!others.contains(&lurker.id()));
    }

    #[tokio::test]
    async fn concurrent_registrations_never_share_a_name() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for index in 0..32 {
            let registry = Arc::clone(&registry);
            let conn = connection(&registry);
            tasks.push(tokio::spawn(async move {
                let name = format!("user-{}", index % 4);
                registry.register(conn, &name).await.is_ok()
            }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.expect("task completes") {
                successes += 1;
            }
        }

        let names = registry.usernames().await;
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(successes, 4);
        assert_eq!(names.len(), unique.len());
    }
}
