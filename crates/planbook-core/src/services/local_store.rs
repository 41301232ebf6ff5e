//! Session-level facade over the local store.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::auth::{self, CredentialFailure, CredentialVerification, SignOutOptions};
use crate::config::StoreConfig;
use crate::db::{
    begin, finish, ConflictLog, CredentialsRepository, Database, EntityRepository,
    LibSqlEntityRepository, SyncQueue,
};
use crate::error::{Error, Result};
use crate::hydration::{HydrationController, HydrationState};
use crate::models::{
    CachedIdentity, CachedProfile, ConflictRecord, EntityId, EntityRecord, EntityTable, Fields,
    LookupIndex, Mutation, MutationKind, OfflineCredentials, RangeIndex, SyncQueueEntry,
};
use crate::util::{normalize_email, unix_millis_now};

/// Thread-safe handle to the local store.
///
/// Every write commits the entity row and its outbox entry in one
/// transaction. Clones share the same database and hydration state.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    device_id: Arc<str>,
    schema_version: u32,
    hydration: Arc<HydrationController>,
    config: StoreConfig,
}

impl LocalStore {
    /// Open (and migrate) the store at `path`
    pub async fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::open(path).await?;
        Self::from_database(db, config).await
    }

    /// Open an in-memory store with default settings (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreConfig::default()).await
    }

    /// Open an in-memory store with explicit settings
    pub async fn open_in_memory_with(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::open_in_memory().await?;
        Self::from_database(db, config).await
    }

    async fn from_database(db: Database, config: StoreConfig) -> Result<Self> {
        if let Some(device_id) = config.device_id.as_deref() {
            db.set_device_id(device_id).await?;
        }
        let device_id = db.device_id().await?;
        let schema_version = db.schema_version();
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            device_id: Arc::from(device_id),
            schema_version,
            hydration: Arc::new(HydrationController::new()),
            config,
        })
    }

    pub(crate) const fn database(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    /// Identity stamped on every local write
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------

    /// Hydration controller of the current session
    pub fn hydration(&self) -> &Arc<HydrationController> {
        &self.hydration
    }

    pub fn hydration_state(&self) -> HydrationState {
        self.hydration.state()
    }

    pub fn subscribe_hydration(&self) -> watch::Receiver<HydrationState> {
        self.hydration.subscribe()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydration.is_hydrated()
    }

    pub fn set_hydrated(&self, hydrated: bool) {
        self.hydration.set_hydrated(hydrated);
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Create an entity at the end of its ordering scope
    pub async fn create(
        &self,
        table: EntityTable,
        user_id: &str,
        parent_id: Option<EntityId>,
        fields: Fields,
    ) -> Result<EntityRecord> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            if let Some(parent_id) = &parent_id {
                ensure_parent(conn, table, parent_id).await?;
            }
            let repo = LibSqlEntityRepository::new(conn, table);
            let mut record = EntityRecord::new(user_id, &*self.device_id, fields);
            record.parent_id = parent_id;
            record.order = Some(repo.next_order(user_id, parent_id.as_ref()).await?);
            repo.insert(&record).await?;
            SyncQueue::new(conn)
                .enqueue(table, &Mutation::new(MutationKind::Create, record.clone()))
                .await?;
            Ok::<_, Error>(record)
        }
        .await;
        finish(conn, result).await
    }

    /// Fetch a live entity
    pub async fn get(&self, table: EntityTable, id: &EntityId) -> Result<Option<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .get(id)
            .await
    }

    pub async fn list_by_user(&self, table: EntityTable, user_id: &str) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .list_by_user(user_id)
            .await
    }

    pub async fn list_by_parent(
        &self,
        table: EntityTable,
        parent_id: &EntityId,
    ) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .list_by_parent(parent_id)
            .await
    }

    pub async fn list_updated_between(
        &self,
        table: EntityTable,
        start: i64,
        end: i64,
    ) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .list_updated_between(start, end)
            .await
    }

    pub async fn query_by_index(
        &self,
        table: EntityTable,
        index: LookupIndex,
        value: &str,
    ) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .list_by_index(index, value)
            .await
    }

    pub async fn query_range(
        &self,
        table: EntityTable,
        index: RangeIndex,
        start: i64,
        end: i64,
    ) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .list_range(index, start, end)
            .await
    }

    /// Merge `patch` into an entity's fields. `null` values remove a field.
    pub async fn update_fields(
        &self,
        table: EntityTable,
        id: &EntityId,
        patch: Fields,
    ) -> Result<EntityRecord> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            let repo = LibSqlEntityRepository::new(conn, table);
            let mut record = repo
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{table}/{id}")))?;
            for (key, value) in patch {
                if value.is_null() {
                    record.fields.remove(&key);
                } else {
                    record.fields.insert(key, value);
                }
            }
            self.save_with_outbox(conn, table, &record, MutationKind::Update)
                .await
        }
        .await;
        finish(conn, result).await
    }

    /// Persist a full entity value as a local edit
    pub async fn save(&self, table: EntityTable, record: &EntityRecord) -> Result<EntityRecord> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = self
            .save_with_outbox(conn, table, record, MutationKind::Update)
            .await;
        finish(conn, result).await
    }

    /// Soft-delete an entity; the tombstone is kept and synced
    pub async fn delete(&self, table: EntityTable, id: &EntityId) -> Result<EntityRecord> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            let deleted = LibSqlEntityRepository::new(conn, table)
                .soft_delete(id, &self.device_id)
                .await?;
            SyncQueue::new(conn)
                .enqueue(table, &Mutation::new(MutationKind::Delete, deleted.clone()))
                .await?;
            Ok::<_, Error>(deleted)
        }
        .await;
        finish(conn, result).await
    }

    /// Rewrite the ordering scope `(user_id, parent_id)` to follow `ordered_ids`.
    ///
    /// Only entities whose position changed are written and queued.
    pub async fn reorder(
        &self,
        table: EntityTable,
        user_id: &str,
        parent_id: Option<&EntityId>,
        ordered_ids: &[EntityId],
    ) -> Result<Vec<EntityRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let result = async {
            let repo = LibSqlEntityRepository::new(conn, table);
            let mut reordered = Vec::with_capacity(ordered_ids.len());
            for (position, id) in (0_i64..).zip(ordered_ids) {
                let mut record = repo
                    .get(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("{table}/{id}")))?;
                if record.user_id != user_id || record.parent_id.as_ref() != parent_id {
                    return Err(Error::InvalidInput(format!(
                        "{table}/{id} is outside the ordering scope"
                    )));
                }
                if record.order != Some(position) {
                    record.order = Some(position);
                    record = self
                        .save_with_outbox(conn, table, &record, MutationKind::Update)
                        .await?;
                }
                reordered.push(record);
            }
            Ok::<_, Error>(reordered)
        }
        .await;
        finish(conn, result).await
    }

    async fn save_with_outbox(
        &self,
        conn: &libsql::Connection,
        table: EntityTable,
        record: &EntityRecord,
        kind: MutationKind,
    ) -> Result<EntityRecord> {
        let saved = LibSqlEntityRepository::new(conn, table)
            .save(record, &self.device_id)
            .await?;
        SyncQueue::new(conn)
            .enqueue(table, &Mutation::new(kind, saved.clone()))
            .await?;
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Outbox and conflicts
    // ------------------------------------------------------------------

    pub async fn pending_mutations(&self) -> Result<Vec<SyncQueueEntry>> {
        let db = self.db.lock().await;
        SyncQueue::new(db.connection()).pending().await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        SyncQueue::new(db.connection()).count().await
    }

    /// Most recent conflicts first
    pub async fn list_conflicts(&self, limit: u32) -> Result<Vec<ConflictRecord>> {
        let db = self.db.lock().await;
        ConflictLog::new(db.connection()).list(limit).await
    }

    pub async fn conflicts_for(&self, entity_id: &EntityId) -> Result<Vec<ConflictRecord>> {
        let db = self.db.lock().await;
        ConflictLog::new(db.connection())
            .list_for_entity(entity_id)
            .await
    }

    // ------------------------------------------------------------------
    // Offline credentials
    // ------------------------------------------------------------------

    /// Store a verifier for the user who just signed in online.
    ///
    /// The row is read back; anything short of an exact match is
    /// [`Error::CredentialPersistence`].
    pub async fn cache_credentials(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        profile: CachedProfile,
    ) -> Result<CachedIdentity> {
        let user_id = user_id.trim();
        let email = normalize_email(email);
        if user_id.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "user id, email and password are required".to_string(),
            ));
        }

        let verifier =
            auth::derive_verifier(password.to_string(), self.config.kdf_iterations).await?;
        let credentials = OfflineCredentials {
            user_id: user_id.to_string(),
            email,
            salt: verifier.salt,
            derived_key: verifier.derived_key,
            iterations: verifier.iterations,
            profile,
            cached_at: unix_millis_now(),
        };

        let db = self.db.lock().await;
        let repo = CredentialsRepository::new(db.connection());
        repo.save(&credentials).await?;

        match repo.load().await? {
            Some(stored) if stored == credentials && stored.is_complete() => {
                tracing::info!("Cached offline credentials for user {user_id}");
                Ok(stored.identity())
            }
            Some(_) => Err(Error::CredentialPersistence(
                "stored credentials do not match what was written".to_string(),
            )),
            None => Err(Error::CredentialPersistence(
                "credentials row missing after write".to_string(),
            )),
        }
    }

    /// Check an offline sign-in attempt against the cached verifier.
    ///
    /// `expected_user_id` is the last known account, when the caller has one.
    pub async fn verify_credentials(
        &self,
        expected_user_id: Option<&str>,
        email: &str,
        password: &str,
    ) -> Result<CredentialVerification> {
        let stored = {
            let db = self.db.lock().await;
            CredentialsRepository::new(db.connection()).load().await?
        };

        let Some(stored) = stored.filter(OfflineCredentials::is_complete) else {
            return Ok(CredentialVerification::Invalid(
                CredentialFailure::NoCredentials,
            ));
        };
        if expected_user_id.is_some_and(|expected| expected.trim() != stored.user_id) {
            return Ok(CredentialVerification::Invalid(
                CredentialFailure::UserMismatch,
            ));
        }
        if normalize_email(email) != normalize_email(&stored.email) {
            return Ok(CredentialVerification::Invalid(
                CredentialFailure::EmailMismatch,
            ));
        }
        if !auth::password_matches(password.to_string(), &stored).await? {
            return Ok(CredentialVerification::Invalid(
                CredentialFailure::PasswordMismatch,
            ));
        }
        Ok(CredentialVerification::Valid(stored.identity()))
    }

    /// Re-derive the verifier after an online password change.
    ///
    /// Returns false when no credentials are cached for `user_id`.
    pub async fn update_credentials_password(
        &self,
        user_id: &str,
        new_password: &str,
    ) -> Result<bool> {
        if new_password.is_empty() {
            return Err(Error::InvalidInput("password must not be empty".to_string()));
        }
        if !self.has_credentials_for(user_id).await? {
            return Ok(false);
        }

        let verifier =
            auth::derive_verifier(new_password.to_string(), self.config.kdf_iterations).await?;
        let db = self.db.lock().await;
        CredentialsRepository::new(db.connection())
            .update_verifier(
                user_id.trim(),
                &verifier.salt,
                &verifier.derived_key,
                verifier.iterations,
                unix_millis_now(),
            )
            .await
    }

    /// Refresh the cached profile. Returns false when no credentials are cached for `user_id`.
    pub async fn update_credentials_profile(
        &self,
        user_id: &str,
        profile: &CachedProfile,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        CredentialsRepository::new(db.connection())
            .update_profile(user_id.trim(), profile)
            .await
    }

    /// Remove the offline verifier. Returns whether one existed.
    pub async fn clear_credentials(&self) -> Result<bool> {
        let db = self.db.lock().await;
        CredentialsRepository::new(db.connection()).clear().await
    }

    /// Non-secret view of who can sign in offline
    pub async fn cached_identity(&self) -> Result<Option<CachedIdentity>> {
        let db = self.db.lock().await;
        Ok(CredentialsRepository::new(db.connection())
            .load()
            .await?
            .filter(OfflineCredentials::is_complete)
            .map(|credentials| credentials.identity()))
    }

    /// End the session: hydration starts over, credentials go unless preserved
    pub async fn sign_out(&self, options: SignOutOptions) -> Result<()> {
        let db = self.db.lock().await;
        // Under the lock so no hydration batch commits after this point.
        self.hydration.reset();
        if !options.preserve_offline_credentials {
            CredentialsRepository::new(db.connection()).clear().await?;
        }
        drop(db);
        tracing::info!(
            "Signed out (offline credentials {})",
            if options.preserve_offline_credentials {
                "kept"
            } else {
                "cleared"
            }
        );
        Ok(())
    }

    async fn has_credentials_for(&self, user_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        Ok(CredentialsRepository::new(db.connection())
            .load()
            .await?
            .is_some_and(|stored| stored.user_id == user_id.trim()))
    }
}

async fn ensure_parent(
    conn: &libsql::Connection,
    table: EntityTable,
    parent_id: &EntityId,
) -> Result<()> {
    let parent_table = table
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("{table} entries have no parent")))?;
    LibSqlEntityRepository::new(conn, parent_table)
        .get(parent_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| Error::NotFound(format!("{parent_table}/{parent_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    const FAST_KDF: u32 = 1_000;

    async fn store() -> LocalStore {
        LocalStore::open_in_memory_with(StoreConfig {
            kdf_iterations: FAST_KDF,
            device_id: None,
        })
        .await
        .unwrap()
    }

    fn named(name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!(name));
        fields
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_commits_entity_and_outbox_together() {
        let store = store().await;
        let list = store
            .create(EntityTable::GoalLists, "user-1", None, named("2026"))
            .await
            .unwrap();

        assert_eq!(list.version, 1);
        assert_eq!(list.order, Some(0));
        assert_eq!(list.device_id, store.device_id());
        assert_eq!(
            store.get(EntityTable::GoalLists, &list.id).await.unwrap(),
            Some(list.clone())
        );

        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[0].record, list);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn children_need_an_existing_parent() {
        let store = store().await;

        let missing = store
            .create(EntityTable::Goals, "user-1", Some(EntityId::new()), named("g"))
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        assert_eq!(store.pending_count().await.unwrap(), 0);

        let orphan_parent = store
            .create(EntityTable::Routines, "user-1", Some(EntityId::new()), named("r"))
            .await;
        assert!(matches!(orphan_parent, Err(Error::InvalidInput(_))));

        let list = store
            .create(EntityTable::GoalLists, "user-1", None, named("l"))
            .await
            .unwrap();
        let goal = store
            .create(EntityTable::Goals, "user-1", Some(list.id), named("g"))
            .await
            .unwrap();
        assert_eq!(
            store.list_by_parent(EntityTable::Goals, &list.id).await.unwrap(),
            vec![goal]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edits_coalesce_into_one_pending_entry() {
        let store = store().await;
        let todo = store
            .create(EntityTable::LongTermTodos, "user-1", None, named("Learn piano"))
            .await
            .unwrap();

        let mut patch = Fields::new();
        patch.insert("done".to_string(), json!(true));
        let updated = store
            .update_fields(EntityTable::LongTermTodos, &todo.id, patch)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.fields["done"], json!(true));
        assert_eq!(updated.field_str("name"), Some("Learn piano"));

        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[0].record, updated);

        let deleted = store
            .delete(EntityTable::LongTermTodos, &todo.id)
            .await
            .unwrap();
        assert!(deleted.deleted);
        assert!(store
            .get(EntityTable::LongTermTodos, &todo.id)
            .await
            .unwrap()
            .is_none());
        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Delete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_patch_null_removes_field() {
        let store = store().await;
        let mut fields = named("Walk");
        fields.insert("note".to_string(), json!("daily"));
        let routine = store
            .create(EntityTable::Routines, "user-1", None, fields)
            .await
            .unwrap();

        let mut patch = Fields::new();
        patch.insert("note".to_string(), serde_json::Value::Null);
        let updated = store
            .update_fields(EntityTable::Routines, &routine.id, patch)
            .await
            .unwrap();
        assert!(!updated.fields.contains_key("note"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reorder_rewrites_scope_positions() {
        let store = store().await;
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let record = store
                .create(EntityTable::TaskCategories, "user-1", None, named(name))
                .await
                .unwrap();
            ids.push(record.id);
        }
        ids.reverse();

        let reordered = store
            .reorder(EntityTable::TaskCategories, "user-1", None, &ids)
            .await
            .unwrap();
        assert_eq!(
            reordered.iter().map(|r| r.order).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
        // "b" kept position 1 and was not rewritten
        assert_eq!(reordered[1].version, 1);
        assert_eq!(reordered[0].version, 2);

        let listed = store
            .list_by_user(EntityTable::TaskCategories, "user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(listed, ids);

        let outsider = store
            .create(EntityTable::TaskCategories, "user-2", None, named("x"))
            .await
            .unwrap();
        let result = store
            .reorder(EntityTable::TaskCategories, "user-1", None, &[outsider.id])
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_reopens_with_data_and_device() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("planbook.db");
        let config = StoreConfig {
            kdf_iterations: FAST_KDF,
            device_id: Some("desk-7".to_string()),
        };

        let id = {
            let store = LocalStore::open(&path, config.clone()).await.unwrap();
            assert_eq!(store.device_id(), "desk-7");
            store
                .create(EntityTable::DailyTasks, "user-1", None, named("Plan day"))
                .await
                .unwrap()
                .id
        };

        let store = LocalStore::open(&path, StoreConfig::default()).await.unwrap();
        assert_eq!(store.device_id(), "desk-7");
        assert!(store.get(EntityTable::DailyTasks, &id).await.unwrap().is_some());
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn credential_round_trip() {
        let store = store().await;
        let identity = store
            .cache_credentials("user-1", " U@X.com ", "pw1", CachedProfile::default())
            .await
            .unwrap();
        assert_eq!(identity.email, "u@x.com");

        let verification = store
            .verify_credentials(Some("user-1"), "u@x.com", "pw1")
            .await
            .unwrap();
        assert_eq!(verification, CredentialVerification::Valid(identity.clone()));
        assert_eq!(store.cached_identity().await.unwrap(), Some(identity));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_login_failure_reasons() {
        let store = store().await;
        assert_eq!(
            store
                .verify_credentials(None, "u@x.com", "pw1")
                .await
                .unwrap(),
            CredentialVerification::Invalid(CredentialFailure::NoCredentials)
        );

        store
            .cache_credentials("user-1", "u@x.com", "pw1", CachedProfile::default())
            .await
            .unwrap();

        let cases = [
            (Some("user-2"), "u@x.com", "pw1", CredentialFailure::UserMismatch),
            (Some("user-1"), "v@x.com", "pw1", CredentialFailure::EmailMismatch),
            (Some("user-1"), "u@x.com", "pw2", CredentialFailure::PasswordMismatch),
        ];
        for (user, email, password, failure) in cases {
            assert_eq!(
                store
                    .verify_credentials(user, email, password)
                    .await
                    .unwrap(),
                CredentialVerification::Invalid(failure)
            );
        }

        assert!(store
            .verify_credentials(None, "U@X.COM", "pw1")
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn password_and_profile_updates() {
        let store = store().await;
        store
            .cache_credentials("user-1", "u@x.com", "old", CachedProfile::default())
            .await
            .unwrap();

        assert!(!store
            .update_credentials_password("user-2", "new")
            .await
            .unwrap());
        assert!(store
            .update_credentials_password("user-1", "new")
            .await
            .unwrap());
        assert!(!store
            .verify_credentials(None, "u@x.com", "old")
            .await
            .unwrap()
            .is_valid());
        assert!(store
            .verify_credentials(None, "u@x.com", "new")
            .await
            .unwrap()
            .is_valid());

        let profile = CachedProfile {
            display_name: Some("Una".to_string()),
            avatar_url: None,
            timezone: Some("UTC".to_string()),
        };
        assert!(store
            .update_credentials_profile("user-1", &profile)
            .await
            .unwrap());
        let identity = store.cached_identity().await.unwrap().unwrap();
        assert_eq!(identity.profile, profile);
        assert!(store
            .verify_credentials(None, "u@x.com", "new")
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn verifier_from_other_iteration_count_still_verifies() {
        let store = store().await;
        store
            .cache_credentials("user-1", "u@x.com", "pw", CachedProfile::default())
            .await
            .unwrap();

        let db = store.database().lock().await;
        let stored = CredentialsRepository::new(db.connection())
            .load()
            .await
            .unwrap()
            .unwrap();
        drop(db);

        let reconfigured = LocalStore {
            config: StoreConfig {
                kdf_iterations: FAST_KDF * 2,
                device_id: None,
            },
            ..store.clone()
        };
        assert_eq!(stored.iterations, FAST_KDF);
        assert!(reconfigured
            .verify_credentials(None, "u@x.com", "pw")
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sign_out_resets_hydration_and_respects_preservation() {
        let store = store().await;
        store
            .cache_credentials("user-1", "u@x.com", "pw", CachedProfile::default())
            .await
            .unwrap();

        store.set_hydrated(true);
        store
            .sign_out(SignOutOptions {
                preserve_offline_credentials: true,
            })
            .await
            .unwrap();
        assert!(!store.is_hydrated());
        assert!(store.cached_identity().await.unwrap().is_some());

        store.sign_out(SignOutOptions::default()).await.unwrap();
        assert!(store.cached_identity().await.unwrap().is_none());
        assert!(!store.clear_credentials().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sign_out_waits_for_writes_holding_the_store() {
        let store = store().await;
        let ticket = store.hydration().begin();

        let guard = store.database().lock().await;
        let signing_out = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .sign_out(SignOutOptions {
                        preserve_offline_credentials: true,
                    })
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(store.hydration().is_live(ticket));
        assert!(!signing_out.is_finished());

        drop(guard);
        signing_out.await.unwrap().unwrap();
        assert!(!store.hydration().is_live(ticket));
        assert_eq!(store.hydration_state(), HydrationState::NotHydrated);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rapid_offline_edits_leave_one_entry_with_final_state() {
        let store = store().await;
        let created = store
            .create(EntityTable::Routines, "user-1", None, named("Stretch"))
            .await
            .unwrap();

        let mut last = created.clone();
        for name in ["Stretch 5m", "Stretch 10m", "Stretch 15m"] {
            last = store
                .update_fields(EntityTable::Routines, &created.id, named(name))
                .await
                .unwrap();
        }

        let pending = store.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::Create);
        assert_eq!(pending[0].record, last);
        assert_eq!(last.field_str("name"), Some("Stretch 15m"));

        let stored = store
            .get(EntityTable::Routines, &created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, last);
        assert_eq!(last.version, created.version + 3);
        assert_eq!(
            EntityRecord {
                version: created.version,
                updated_at: created.updated_at,
                fields: created.fields.clone(),
                ..last.clone()
            },
            created
        );
    }
}
