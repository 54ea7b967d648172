// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite store, records are kept as CBOR blobs keyed by their hex ids.
use std::sync::Arc;

use arbor_core::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use arbor_core::traits::{
    CommunityPolicyResolver, CredentialIndex, LoadedNode, PolicyStore, RelationSet,
};
use arbor_core::{
    ActorId, AuthorizationPolicy, CommunityPolicyView, Credential, CredentialCriterion,
    EntitlementType, GrantedEntitlement, IdError, License, LicenseId, LicensingFramework, NodeId,
    PolicyId, ResourceNode,
};
use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqliteConnection, migrate};
use thiserror::Error;
use tracing::trace;

/// Create SQLite database if it doesn't already exist.
pub async fn create_database(url: &str) -> Result<(), SqliteError> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?
    }
    Ok(())
}

pub fn migrations() -> Migrator {
    migrate!()
}

pub struct SqliteStoreBuilder {
    url: String,
    max_connections: u32,
    create_database: bool,
    run_migrations: bool,
    framework: LicensingFramework,
}

impl Default for SqliteStoreBuilder {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            max_connections: 16,
            create_database: true,
            run_migrations: true,
            framework: LicensingFramework::default(),
        }
    }
}

impl SqliteStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory database with a random name, isolated from other tests.
    #[cfg(test)]
    pub fn random_memory_url(mut self) -> Self {
        self.url = format!(
            "sqlite://arbormem{}?mode=memory&cache=private",
            rand::random::<u32>()
        );
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_database(mut self, create_database: bool) -> Self {
        self.create_database = create_database;
        self
    }

    pub fn run_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    /// Licensing catalog used to resolve credential grants.
    pub fn licensing_framework(mut self, framework: LicensingFramework) -> Self {
        self.framework = framework;
        self
    }

    pub async fn build(self) -> Result<SqliteStore, SqliteError> {
        if self.create_database {
            create_database(&self.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await?;

        if self.run_migrations {
            migrations().run(&pool).await?;
        }

        Ok(SqliteStore {
            pool,
            framework: Arc::new(self.framework),
        })
    }
}

/// SQLite backed store.
///
/// Cloned instances share the same connection pool. Batch writes and multi-record reads run
/// inside one transaction each.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
    framework: Arc<LicensingFramework>,
}

impl SqliteStore {
    #[cfg(test)]
    pub async fn temporary() -> Self {
        SqliteStoreBuilder::new()
            .random_memory_url()
            .max_connections(1)
            .build()
            .await
            .expect("migrations succeeded")
    }
}

async fn fetch_node(
    conn: &mut SqliteConnection,
    id: &NodeId,
) -> Result<Option<ResourceNode>, SqliteError> {
    let bytes = sqlx::query_scalar::<_, Vec<u8>>("SELECT node FROM nodes WHERE id = ?")
        .bind(id.to_hex())
        .fetch_optional(&mut *conn)
        .await?;
    bytes
        .map(|bytes| decode_cbor(&bytes[..]))
        .transpose()
        .map_err(SqliteError::from)
}

async fn fetch_authorization(
    conn: &mut SqliteConnection,
    id: &PolicyId,
) -> Result<Option<AuthorizationPolicy>, SqliteError> {
    let bytes =
        sqlx::query_scalar::<_, Vec<u8>>("SELECT policy FROM authorization_policies WHERE id = ?")
            .bind(id.to_hex())
            .fetch_optional(&mut *conn)
            .await?;
    bytes
        .map(|bytes| decode_cbor(&bytes[..]))
        .transpose()
        .map_err(SqliteError::from)
}

async fn fetch_license(
    conn: &mut SqliteConnection,
    id: &LicenseId,
) -> Result<Option<License>, SqliteError> {
    let bytes = sqlx::query_scalar::<_, Vec<u8>>("SELECT license FROM licenses WHERE id = ?")
        .bind(id.to_hex())
        .fetch_optional(&mut *conn)
        .await?;
    bytes
        .map(|bytes| decode_cbor(&bytes[..]))
        .transpose()
        .map_err(SqliteError::from)
}

async fn upsert_authorization(
    conn: &mut SqliteConnection,
    authorization: &AuthorizationPolicy,
) -> Result<(), SqliteError> {
    sqlx::query(
        "
        INSERT INTO authorization_policies (id, owner_id, policy)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, policy = excluded.policy
        ",
    )
    .bind(authorization.id.to_hex())
    .bind(authorization.owner.to_hex())
    .bind(encode_cbor(authorization)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_license(conn: &mut SqliteConnection, license: &License) -> Result<(), SqliteError> {
    sqlx::query(
        "
        INSERT INTO licenses (id, owner_id, license)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, license = excluded.license
        ",
    )
    .bind(license.id.to_hex())
    .bind(license.owner.to_hex())
    .bind(encode_cbor(license)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_node(conn: &mut SqliteConnection, node: &ResourceNode) -> Result<(), SqliteError> {
    sqlx::query(
        "
        INSERT INTO nodes (id, actor_id, node)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET actor_id = excluded.actor_id, node = excluded.node
        ",
    )
    .bind(node.id.to_hex())
    .bind(node.actor_id.to_hex())
    .bind(encode_cbor(node)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn resource_column(credential: &Credential) -> String {
    credential
        .resource_id
        .map(|id| id.to_hex())
        .unwrap_or_default()
}

impl PolicyStore for SqliteStore {
    type Error = SqliteError;

    async fn load_node(
        &self,
        id: &NodeId,
        relations: RelationSet,
    ) -> Result<Option<LoadedNode>, Self::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(node) = fetch_node(&mut tx, id).await? else {
            return Ok(None);
        };
        let mut loaded = LoadedNode::new(node);

        if relations.authorization {
            loaded.authorization = fetch_authorization(&mut tx, &loaded.node.authorization_id).await?;
        }

        if relations.license {
            loaded.license = fetch_license(&mut tx, &loaded.node.license_id).await?;
        }

        if relations.parent || relations.parent_authorization {
            let parent = match loaded.node.parent_id {
                Some(parent_id) => fetch_node(&mut tx, &parent_id).await?,
                None => None,
            };

            if relations.parent_authorization {
                if let Some(parent) = &parent {
                    loaded.parent_authorization =
                        fetch_authorization(&mut tx, &parent.authorization_id).await?;
                }
            }

            if relations.parent {
                loaded.parent = parent;
            }
        }

        if (relations.account || relations.account_authorization) && !loaded.node.is_account() {
            let account = fetch_node(&mut tx, &loaded.node.account_id()).await?;

            if relations.account_authorization {
                if let Some(account) = &account {
                    loaded.account_authorization =
                        fetch_authorization(&mut tx, &account.authorization_id).await?;
                }
            }

            if relations.account {
                loaded.account = account;
            }
        }

        tx.commit().await?;

        Ok(Some(loaded))
    }

    async fn node_by_actor(&self, actor: &ActorId) -> Result<Option<NodeId>, Self::Error> {
        let id = sqlx::query_scalar::<_, String>("SELECT id FROM nodes WHERE actor_id = ? LIMIT 1")
            .bind(actor.to_hex())
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(|id| id.parse()).transpose()?)
    }

    async fn insert_node(
        &self,
        node: &ResourceNode,
        authorization: &AuthorizationPolicy,
        license: &License,
    ) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        upsert_node(&mut tx, node).await?;
        upsert_authorization(&mut tx, authorization).await?;
        upsert_license(&mut tx, license).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_node(&self, node: &ResourceNode) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        upsert_node(&mut conn, node).await
    }

    async fn save_overlays(
        &self,
        authorizations: &[AuthorizationPolicy],
        licenses: &[License],
    ) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;

        for authorization in authorizations {
            upsert_authorization(&mut tx, authorization).await?;
        }

        for license in licenses {
            upsert_license(&mut tx, license).await?;
        }

        // Dropping the transaction on an error above rolls everything back.
        tx.commit().await?;

        trace!(
            authorizations = authorizations.len(),
            licenses = licenses.len(),
            "saved overlays"
        );

        Ok(())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(node) = fetch_node(&mut tx, id).await? {
            sqlx::query("DELETE FROM authorization_policies WHERE id = ?")
                .bind(node.authorization_id.to_hex())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM licenses WHERE id = ?")
                .bind(node.license_id.to_hex())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM nodes WHERE id = ?")
                .bind(id.to_hex())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

impl CredentialIndex for SqliteStore {
    type Error = SqliteError;

    async fn credentials(&self, actor: &ActorId) -> Result<Vec<Credential>, Self::Error> {
        let rows = sqlx::query_scalar::<_, Vec<u8>>(
            "
            SELECT credential FROM credentials
            WHERE actor_id = ?
            ORDER BY credential_type, resource_id
            ",
        )
        .bind(actor.to_hex())
        .fetch_all(&self.pool)
        .await?;

        let mut credentials = Vec::with_capacity(rows.len());
        for bytes in rows {
            credentials.push(decode_cbor(&bytes[..])?);
        }
        Ok(credentials)
    }

    async fn has_credential(
        &self,
        actor: &ActorId,
        criterion: &CredentialCriterion,
    ) -> Result<bool, Self::Error> {
        let credentials = self.credentials(actor).await?;
        Ok(credentials.iter().any(|held| criterion.matches(held)))
    }

    async fn granted_entitlement(
        &self,
        entitlement_type: &EntitlementType,
        actor: &ActorId,
    ) -> Result<Option<GrantedEntitlement>, Self::Error> {
        let credentials = self.credentials(actor).await?;
        Ok(self
            .framework
            .granted_entitlement(entitlement_type, &credentials))
    }

    async fn assign_credential(
        &self,
        actor: &ActorId,
        credential: Credential,
    ) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            "
            INSERT OR IGNORE INTO credentials (actor_id, credential_type, resource_id, credential)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(actor.to_hex())
        .bind(credential.credential_type.as_str())
        .bind(resource_column(&credential))
        .bind(encode_cbor(&credential)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_credential(
        &self,
        actor: &ActorId,
        credential: &Credential,
    ) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            "
            DELETE FROM credentials
            WHERE actor_id = ? AND credential_type = ? AND resource_id = ?
            ",
        )
        .bind(actor.to_hex())
        .bind(credential.credential_type.as_str())
        .bind(resource_column(credential))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

impl CommunityPolicyResolver for SqliteStore {
    type Error = SqliteError;

    async fn policy_view(&self, node_id: &NodeId) -> Result<Option<CommunityPolicyView>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let node = fetch_node(&mut conn, node_id).await?;
        Ok(node
            .as_ref()
            .and_then(|node| node.space_details())
            .map(|details| CommunityPolicyView::from(&details.settings)))
    }
}

#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database and connection error.
    #[error(transparent)]
    Sqlite(#[from] sqlx::Error),

    /// SQL table schema migration error.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed encoding record: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed decoding record: {0}")]
    Decode(#[from] DecodeError),

    #[error("malformed id in database: {0}")]
    Id(#[from] IdError),
}

#[cfg(test)]
mod tests {
    use arbor_core::traits::{
        CommunityPolicyResolver, CredentialIndex, PolicyStore, RelationSet,
    };
    use arbor_core::{
        AccountDetails, AccountType, ActorId, AuthorizationPolicy, BaselineLicensePlan,
        Credential, CredentialRule, CredentialType, EntitlementType, License, LicenseId, NodeId,
        NodeKind, PolicyId, Privilege, ResourceNode, SpaceDetails, SpaceSettings,
    };

    use super::SqliteStore;

    fn account() -> ResourceNode {
        ResourceNode {
            id: NodeId::random(),
            kind: NodeKind::Account(AccountDetails {
                account_type: AccountType::Organization,
                baseline_plan: BaselineLicensePlan::default(),
                external_subscription_id: Some("sub-1".into()),
            }),
            level: 0,
            parent_id: None,
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        }
    }

    fn space(account: &ResourceNode) -> ResourceNode {
        ResourceNode {
            id: NodeId::random(),
            kind: NodeKind::SpaceRoot(SpaceDetails {
                account_id: account.id,
                settings: SpaceSettings::for_level(0),
            }),
            level: 0,
            parent_id: Some(account.id),
            children: Vec::new(),
            actor_id: ActorId::random(),
            authorization_id: PolicyId::random(),
            license_id: LicenseId::random(),
        }
    }

    #[tokio::test]
    async fn nodes_and_overlays() {
        let store = SqliteStore::temporary().await;

        let account = account();
        let account_policy = AuthorizationPolicy::new(account.authorization_id, account.id);
        let account_license = License::account(account.license_id, account.id);
        store
            .insert_node(&account, &account_policy, &account_license)
            .await
            .unwrap();

        let space = space(&account);
        let space_policy = AuthorizationPolicy::new(space.authorization_id, space.id);
        let space_license = License::space(space.license_id, space.id);
        store
            .insert_node(&space, &space_policy, &space_license)
            .await
            .unwrap();

        let mut updated_policy = account_policy.reset();
        updated_policy.anonymous_read_access = true;
        updated_policy.append_credential_rule(CredentialRule::new(
            "account-admin-manage",
            [Privilege::Read, Privilege::Update],
            [Credential::scoped(CredentialType::AccountAdmin, account.id)],
            true,
        ));
        let mut updated_license = account_license.reset();
        updated_license.entitlements[0].set_limit(2);
        store
            .save_overlays(&[updated_policy.clone()], &[updated_license.clone()])
            .await
            .unwrap();

        let loaded = store
            .load_node(&space.id, RelationSet::ALL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.node, space);
        assert_eq!(loaded.authorization, Some(space_policy));
        assert_eq!(loaded.license, Some(space_license));
        assert_eq!(loaded.parent_authorization, Some(updated_policy.clone()));
        assert_eq!(loaded.account_authorization, Some(updated_policy));
        assert_eq!(loaded.account, Some(account.clone()));

        let loaded = store
            .load_node(&account.id, RelationSet::OVERLAYS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.license, Some(updated_license));
        assert_eq!(
            store.node_by_actor(&account.actor_id).await.unwrap(),
            Some(account.id)
        );

        assert!(store.policy_view(&space.id).await.unwrap().is_some());
        assert!(store.policy_view(&account.id).await.unwrap().is_none());

        store.delete_node(&space.id).await.unwrap();
        assert!(
            store
                .load_node(&space.id, RelationSet::NONE)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn credential_index() {
        let store = SqliteStore::temporary().await;
        let actor = ActorId::random();
        let space = NodeId::random();

        let free = Credential::global(CredentialType::AccountLicenseFree);
        let plus = Credential::global(CredentialType::AccountLicensePlus);
        let member = Credential::scoped(CredentialType::SpaceMember, space);

        assert!(store.assign_credential(&actor, free).await.unwrap());
        assert!(store.assign_credential(&actor, plus).await.unwrap());
        assert!(store.assign_credential(&actor, member).await.unwrap());
        assert!(!store.assign_credential(&actor, member).await.unwrap());

        assert_eq!(store.credentials(&actor).await.unwrap().len(), 3);
        assert!(store.has_credential(&actor, &member).await.unwrap());
        assert!(
            !store
                .has_credential(
                    &actor,
                    &Credential::scoped(CredentialType::SpaceMember, NodeId::random())
                )
                .await
                .unwrap()
        );

        let granted = store
            .granted_entitlement(&EntitlementType::AccountSpaceFree, &actor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(granted.limit, 4);

        assert!(store.remove_credential(&actor, &plus).await.unwrap());
        let granted = store
            .granted_entitlement(&EntitlementType::AccountSpaceFree, &actor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(granted.limit, 1);
    }
}
