//! Postgres backend. Every entity is a JSONB document in a single table; writes
//! run in a transaction holding one advisory lock so the shared document rules
//! see a consistent collection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Transaction};
use tracing::info;

use super::*;

const USERS: &str = "users";
const ROLES: &str = "roles";
const TOKENS: &str = "refresh_tokens";
const CATEGORIES: &str = "categories";
const PRODUCTS: &str = "products";
const BAGS: &str = "bags";
const ORDERS: &str = "orders";
const RECURRING: &str = "recurring";
const SUPPLIERS: &str = "suppliers";
const POSTS: &str = "posts";

const WRITE_LOCK: i64 = 0x6672_6573_6870;

fn db(e: sqlx::Error) -> RepoError { RepoError::Internal(e.to_string()) }
fn codec(e: serde_json::Error) -> RepoError { RepoError::Internal(format!("document codec: {e}")) }

async fn load<T: DeserializeOwned>(conn: &mut PgConnection, collection: &str) -> RepoResult<HashMap<Id, T>> {
    let rows: Vec<(i64, Json<serde_json::Value>)> =
        sqlx::query_as("SELECT id, body FROM documents WHERE collection = $1")
            .bind(collection)
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
    rows.into_iter()
        .map(|(id, Json(body))| serde_json::from_value(body).map(|doc| (id, doc)).map_err(codec))
        .collect()
}

async fn fetch<T: DeserializeOwned>(conn: &mut PgConnection, collection: &str, id: Id) -> RepoResult<T> {
    let row: Option<(Json<serde_json::Value>,)> =
        sqlx::query_as("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db)?;
    let (Json(body),) = row.ok_or(RepoError::NotFound)?;
    serde_json::from_value(body).map_err(codec)
}

async fn put<T: Serialize>(conn: &mut PgConnection, collection: &str, id: Id, doc: &T) -> RepoResult<()> {
    let body = serde_json::to_value(doc).map_err(codec)?;
    sqlx::query(
        "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
         ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body",
    )
    .bind(collection)
    .bind(id)
    .bind(Json(body))
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

async fn remove(conn: &mut PgConnection, collection: &str, id: Id) -> RepoResult<bool> {
    let done = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(done.rows_affected() > 0)
}

async fn next_id(conn: &mut PgConnection) -> RepoResult<Id> {
    sqlx::query_scalar("SELECT nextval('document_ids')").fetch_one(&mut *conn).await.map_err(db)
}

fn sorted<T>(m: HashMap<Id, T>) -> Vec<T> {
    let mut v: Vec<(Id, T)> = m.into_iter().collect();
    v.sort_by_key(|(id, _)| *id);
    v.into_iter().map(|(_, t)| t).collect()
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    /// Connects, applies migrations and seeds the built-in roles.
    pub async fn connect(database_url: &str) -> RepoResult<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await.map_err(db)?;
        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| RepoError::Internal(e.to_string()))?;
        let mut tx = self.begin().await?;
        for role in builtin_roles(Utc::now()) {
            sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING")
                .bind(ROLES)
                .bind(role.id)
                .bind(Json(serde_json::to_value(&role).map_err(codec)?))
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }
        tx.commit().await.map_err(db)?;
        info!("postgres schema ready");
        Ok(())
    }

    async fn begin(&self) -> RepoResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(WRITE_LOCK).execute(&mut *tx).await.map_err(db)?;
        Ok(tx)
    }

    async fn conn(&self) -> RepoResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(db)
    }

    async fn all<T: DeserializeOwned>(&self, collection: &str) -> RepoResult<Vec<T>> {
        let mut conn = self.conn().await?;
        Ok(sorted(load(&mut conn, collection).await?))
    }

    async fn one<T: DeserializeOwned>(&self, collection: &str, id: Id) -> RepoResult<T> {
        let mut conn = self.conn().await?;
        fetch(&mut conn, collection, id).await
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut tx = self.begin().await?;
        let users = load(&mut tx, USERS).await?;
        let id = next_id(&mut tx).await?;
        let user = insert_user(&users, id, new, Utc::now())?;
        put(&mut tx, USERS, id, &user).await?;
        tx.commit().await.map_err(db)?;
        Ok(user)
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.one(USERS, id).await
    }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        let email = email.trim().to_lowercase();
        let users: Vec<User> = self.all(USERS).await?;
        users.into_iter().find(|u| u.email == email).ok_or(RepoError::NotFound)
    }
    async fn list_users(&self) -> RepoResult<Vec<User>> {
        self.all(USERS).await
    }
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
        let mut tx = self.begin().await?;
        let mut user: User = fetch(&mut tx, USERS, id).await?;
        apply_user_update(&mut user, upd, Utc::now());
        put(&mut tx, USERS, id, &user).await?;
        tx.commit().await.map_err(db)?;
        Ok(user)
    }
    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        if !remove(&mut tx, USERS, id).await? {
            return Err(RepoError::NotFound);
        }
        remove(&mut tx, BAGS, id).await?;
        tx.commit().await.map_err(db)
    }
}

#[async_trait]
impl RoleRepo for PgRepo {
    async fn list_roles(&self) -> RepoResult<Vec<RoleDef>> {
        self.all(ROLES).await
    }
    async fn get_role(&self, name: &str) -> RepoResult<RoleDef> {
        let roles: Vec<RoleDef> = self.all(ROLES).await?;
        roles.into_iter().find(|r| r.name == name).ok_or(RepoError::NotFound)
    }
    async fn create_role(&self, new: NewRole) -> RepoResult<RoleDef> {
        let mut tx = self.begin().await?;
        let roles = load(&mut tx, ROLES).await?;
        let id = next_id(&mut tx).await?;
        let role = insert_role(&roles, id, new, Utc::now())?;
        put(&mut tx, ROLES, id, &role).await?;
        tx.commit().await.map_err(db)?;
        Ok(role)
    }
    async fn update_role(&self, name: &str, upd: UpdateRole) -> RepoResult<RoleDef> {
        let mut tx = self.begin().await?;
        let roles: HashMap<Id, RoleDef> = load(&mut tx, ROLES).await?;
        let mut role = roles.into_values().find(|r| r.name == name).ok_or(RepoError::NotFound)?;
        apply_role_update(&mut role, upd)?;
        put(&mut tx, ROLES, role.id, &role).await?;
        tx.commit().await.map_err(db)?;
        Ok(role)
    }
    async fn delete_role(&self, name: &str) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        let roles: HashMap<Id, RoleDef> = load(&mut tx, ROLES).await?;
        let role = roles.values().find(|r| r.name == name).ok_or(RepoError::NotFound)?;
        let users: HashMap<Id, User> = load(&mut tx, USERS).await?;
        check_role_deletable(role, users.values())?;
        remove(&mut tx, ROLES, role.id).await?;
        tx.commit().await.map_err(db)
    }
}

#[async_trait]
impl TokenRepo for PgRepo {
    async fn store_refresh_token(&self, user_id: Id, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshTokenRecord> {
        let mut tx = self.begin().await?;
        let tokens: HashMap<Id, RefreshTokenRecord> = load(&mut tx, TOKENS).await?;
        if tokens.values().any(|t| t.token_hash == token_hash) {
            return Err(RepoError::Conflict("token already stored".into()));
        }
        let now = Utc::now();
        for expired in tokens.values().filter(|t| t.expires_at <= now) {
            remove(&mut tx, TOKENS, expired.id).await?;
        }
        let id = next_id(&mut tx).await?;
        let rec = RefreshTokenRecord { id, user_id, token_hash: token_hash.to_string(), expires_at, created_at: now, revoked_at: None, replaced_by: None };
        put(&mut tx, TOKENS, id, &rec).await?;
        tx.commit().await.map_err(db)?;
        Ok(rec)
    }
    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshTokenRecord> {
        let tokens: Vec<RefreshTokenRecord> = self.all(TOKENS).await?;
        tokens.into_iter().find(|t| t.token_hash == token_hash).ok_or(RepoError::NotFound)
    }
    async fn revoke_refresh_token(&self, id: Id, replaced_by: Option<Id>) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        let mut t: RefreshTokenRecord = fetch(&mut tx, TOKENS, id).await?;
        if t.revoked_at.is_none() { t.revoked_at = Some(Utc::now()); }
        if replaced_by.is_some() { t.replaced_by = replaced_by; }
        put(&mut tx, TOKENS, id, &t).await?;
        tx.commit().await.map_err(db)
    }
    async fn revoke_user_tokens(&self, user_id: Id) -> RepoResult<usize> {
        let mut tx = self.begin().await?;
        let tokens: HashMap<Id, RefreshTokenRecord> = load(&mut tx, TOKENS).await?;
        let now = Utc::now();
        let mut n = 0;
        for mut t in tokens.into_values().filter(|t| t.user_id == user_id && t.revoked_at.is_none()) {
            t.revoked_at = Some(now);
            put(&mut tx, TOKENS, t.id, &t).await?;
            n += 1;
        }
        tx.commit().await.map_err(db)?;
        Ok(n)
    }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut v: Vec<Category> = self.all(CATEGORIES).await?;
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.one(CATEGORIES, id).await
    }
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        let cats: Vec<Category> = self.all(CATEGORIES).await?;
        cats.into_iter().find(|c| c.slug == slug).ok_or(RepoError::NotFound)
    }
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let mut tx = self.begin().await?;
        let cats = load(&mut tx, CATEGORIES).await?;
        let id = next_id(&mut tx).await?;
        let cat = insert_category(&cats, id, new, Utc::now())?;
        put(&mut tx, CATEGORIES, id, &cat).await?;
        tx.commit().await.map_err(db)?;
        Ok(cat)
    }
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
        let mut tx = self.begin().await?;
        let mut cats = load(&mut tx, CATEGORIES).await?;
        let cat = apply_category_update(&mut cats, id, upd)?;
        put(&mut tx, CATEGORIES, id, &cat).await?;
        tx.commit().await.map_err(db)?;
        Ok(cat)
    }
    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        let products: HashMap<Id, Product> = load(&mut tx, PRODUCTS).await?;
        check_category_deletable(id, products.values())?;
        if !remove(&mut tx, CATEGORIES, id).await? {
            return Err(RepoError::NotFound);
        }
        tx.commit().await.map_err(db)
    }
}

#[async_trait]
impl ProductRepo for PgRepo {
    async fn list_products(&self) -> RepoResult<Vec<Product>> {
        self.all(PRODUCTS).await
    }
    async fn get_product(&self, id: Id) -> RepoResult<Product> {
        self.one(PRODUCTS, id).await
    }
    async fn get_product_by_slug(&self, slug: &str) -> RepoResult<Product> {
        let products: Vec<Product> = self.all(PRODUCTS).await?;
        products.into_iter().find(|p| p.slug == slug).ok_or(RepoError::NotFound)
    }
    async fn create_product(&self, new: NewProduct) -> RepoResult<Product> {
        let mut tx = self.begin().await?;
        let products = load(&mut tx, PRODUCTS).await?;
        let id = next_id(&mut tx).await?;
        let p = insert_product(&products, id, new, Utc::now())?;
        put(&mut tx, PRODUCTS, id, &p).await?;
        tx.commit().await.map_err(db)?;
        Ok(p)
    }
    async fn update_product(&self, id: Id, upd: UpdateProduct) -> RepoResult<Product> {
        let mut tx = self.begin().await?;
        let mut products = load(&mut tx, PRODUCTS).await?;
        let p = apply_product_update(&mut products, id, upd, Utc::now())?;
        put(&mut tx, PRODUCTS, id, &p).await?;
        tx.commit().await.map_err(db)?;
        Ok(p)
    }
    async fn delete_product(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        if !remove(&mut tx, PRODUCTS, id).await? {
            return Err(RepoError::NotFound);
        }
        let bags: HashMap<Id, Bag> = load(&mut tx, BAGS).await?;
        for mut bag in bags.into_values().filter(|b| b.items.iter().any(|i| i.product_id == id)) {
            bag.items.retain(|i| i.product_id != id);
            put(&mut tx, BAGS, bag.user_id, &bag).await?;
        }
        tx.commit().await.map_err(db)
    }
    async fn adjust_stock(&self, id: Id, delta: i64) -> RepoResult<Product> {
        let mut tx = self.begin().await?;
        let mut products = load(&mut tx, PRODUCTS).await?;
        let p = apply_stock_delta(&mut products, id, delta, Utc::now())?;
        put(&mut tx, PRODUCTS, id, &p).await?;
        tx.commit().await.map_err(db)?;
        Ok(p)
    }
    async fn reserve_stock(&self, items: &[BagItem]) -> RepoResult<Vec<Product>> {
        let mut tx = self.begin().await?;
        let mut products = load(&mut tx, PRODUCTS).await?;
        let reserved = reserve_in(&mut products, items, Utc::now())?;
        for p in &reserved {
            put(&mut tx, PRODUCTS, p.id, p).await?;
        }
        tx.commit().await.map_err(db)?;
        Ok(reserved)
    }
    async fn release_stock(&self, items: &[BagItem]) -> RepoResult<()> {
        let mut tx = self.begin().await?;
        let mut products: HashMap<Id, Product> = load(&mut tx, PRODUCTS).await?;
        for id in release_in(&mut products, items, Utc::now()) {
            if let Some(p) = products.get(&id) {
                put(&mut tx, PRODUCTS, id, p).await?;
            }
        }
        tx.commit().await.map_err(db)
    }
}

#[async_trait]
impl BagRepo for PgRepo {
    async fn get_bag(&self, user_id: Id) -> RepoResult<Bag> {
        match self.one(BAGS, user_id).await {
            Err(RepoError::NotFound) => Ok(Bag { user_id, items: vec![], updated_at: Utc::now() }),
            other => other,
        }
    }
    async fn save_bag(&self, bag: Bag) -> RepoResult<Bag> {
        let mut conn = self.conn().await?;
        let bag = Bag { updated_at: Utc::now(), ..bag };
        put(&mut conn, BAGS, bag.user_id, &bag).await?;
        Ok(bag)
    }
    async fn clear_bag(&self, user_id: Id) -> RepoResult<()> {
        let mut conn = self.conn().await?;
        remove(&mut conn, BAGS, user_id).await.map(|_| ())
    }
}

#[async_trait]
impl OrderRepo for PgRepo {
    async fn create_order(&self, new: NewOrder) -> RepoResult<Order> {
        let mut tx = self.begin().await?;
        let id = next_id(&mut tx).await?;
        let order = build_order(id, new, Utc::now());
        put(&mut tx, ORDERS, id, &order).await?;
        tx.commit().await.map_err(db)?;
        Ok(order)
    }
    async fn get_order(&self, id: Id) -> RepoResult<Order> {
        self.one(ORDERS, id).await
    }
    async fn list_orders(&self) -> RepoResult<Vec<Order>> {
        let mut v: Vec<Order> = self.all(ORDERS).await?;
        v.reverse(); // newest first
        Ok(v)
    }
    async fn list_user_orders(&self, user_id: Id) -> RepoResult<Vec<Order>> {
        let mut v = self.list_orders().await?;
        v.retain(|o| o.user_id == user_id);
        Ok(v)
    }
    async fn set_order_status(&self, id: Id, status: OrderStatus) -> RepoResult<Order> {
        let mut tx = self.begin().await?;
        let mut order: Order = fetch(&mut tx, ORDERS, id).await?;
        transition_order(&mut order, status, Utc::now())?;
        put(&mut tx, ORDERS, id, &order).await?;
        tx.commit().await.map_err(db)?;
        Ok(order)
    }
}

#[async_trait]
impl RecurringRepo for PgRepo {
    async fn create_recurring(&self, new: NewRecurringOrder) -> RepoResult<RecurringOrder> {
        let mut tx = self.begin().await?;
        let id = next_id(&mut tx).await?;
        let rec = build_recurring(id, new, Utc::now());
        put(&mut tx, RECURRING, id, &rec).await?;
        tx.commit().await.map_err(db)?;
        Ok(rec)
    }
    async fn get_recurring(&self, id: Id) -> RepoResult<RecurringOrder> {
        self.one(RECURRING, id).await
    }
    async fn list_recurring(&self) -> RepoResult<Vec<RecurringOrder>> {
        self.all(RECURRING).await
    }
    async fn list_user_recurring(&self, user_id: Id) -> RepoResult<Vec<RecurringOrder>> {
        let mut v = self.list_recurring().await?;
        v.retain(|r| r.user_id == user_id);
        Ok(v)
    }
    async fn list_due_recurring(&self, now: DateTime<Utc>) -> RepoResult<Vec<RecurringOrder>> {
        let mut v = self.list_recurring().await?;
        v.retain(|r| r.status == RecurringStatus::Active && r.next_run_at <= now);
        v.sort_by_key(|r| r.next_run_at);
        Ok(v)
    }
    async fn claim_recurring(
        &self,
        id: Id,
        expected: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> RepoResult<Option<RecurringOrder>> {
        let mut tx = self.begin().await?;
        let mut rec: RecurringOrder = fetch(&mut tx, RECURRING, id).await?;
        if !claim_due(&mut rec, expected, next_run_at, Utc::now()) {
            return Ok(None);
        }
        put(&mut tx, RECURRING, id, &rec).await?;
        tx.commit().await.map_err(db)?;
        Ok(Some(rec))
    }
    async fn record_recurring_run(&self, id: Id, run: RecurringRun) -> RepoResult<RecurringOrder> {
        let mut tx = self.begin().await?;
        let mut rec: RecurringOrder = fetch(&mut tx, RECURRING, id).await?;
        apply_run(&mut rec, run, Utc::now());
        put(&mut tx, RECURRING, id, &rec).await?;
        tx.commit().await.map_err(db)?;
        Ok(rec)
    }
    async fn change_recurring(&self, id: Id, action: RecurringAction, now: DateTime<Utc>) -> RepoResult<RecurringOrder> {
        let mut tx = self.begin().await?;
        let mut rec: RecurringOrder = fetch(&mut tx, RECURRING, id).await?;
        apply_recurring_action(&mut rec, action, now)?;
        put(&mut tx, RECURRING, id, &rec).await?;
        tx.commit().await.map_err(db)?;
        Ok(rec)
    }
}

#[async_trait]
impl SupplierRepo for PgRepo {
    async fn create_supplier(&self, new: NewSupplier) -> RepoResult<Supplier> {
        let mut tx = self.begin().await?;
        let suppliers = load(&mut tx, SUPPLIERS).await?;
        let email = new.email.trim().to_lowercase();
        if let Some(old) = check_supplier_email(&suppliers, &email)? {
            remove(&mut tx, SUPPLIERS, old).await?;
        }
        let id = next_id(&mut tx).await?;
        let sup = build_supplier(id, new, Utc::now());
        put(&mut tx, SUPPLIERS, id, &sup).await?;
        tx.commit().await.map_err(db)?;
        Ok(sup)
    }
    async fn get_supplier(&self, id: Id) -> RepoResult<Supplier> {
        self.one(SUPPLIERS, id).await
    }
    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>> {
        self.all(SUPPLIERS).await
    }
    async fn set_supplier_status(&self, id: Id, status: SupplierStatus) -> RepoResult<Supplier> {
        let mut tx = self.begin().await?;
        let mut sup: Supplier = fetch(&mut tx, SUPPLIERS, id).await?;
        sup.status = status;
        sup.reviewed_at = Some(Utc::now());
        put(&mut tx, SUPPLIERS, id, &sup).await?;
        tx.commit().await.map_err(db)?;
        Ok(sup)
    }
    async fn delete_supplier(&self, id: Id) -> RepoResult<()> {
        let mut conn = self.conn().await?;
        if remove(&mut conn, SUPPLIERS, id).await? { Ok(()) } else { Err(RepoError::NotFound) }
    }
}

#[async_trait]
impl BlogRepo for PgRepo {
    async fn list_posts(&self) -> RepoResult<Vec<BlogPost>> {
        let mut v: Vec<BlogPost> = self.all(POSTS).await?;
        v.sort_by(|a, b| b.published_at.unwrap_or(b.created_at).cmp(&a.published_at.unwrap_or(a.created_at)));
        Ok(v)
    }
    async fn get_post(&self, id: Id) -> RepoResult<BlogPost> {
        self.one(POSTS, id).await
    }
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<BlogPost> {
        let posts: Vec<BlogPost> = self.all(POSTS).await?;
        posts.into_iter().find(|p| p.slug == slug).ok_or(RepoError::NotFound)
    }
    async fn create_post(&self, new: NewBlogPost) -> RepoResult<BlogPost> {
        let mut tx = self.begin().await?;
        let posts = load(&mut tx, POSTS).await?;
        let id = next_id(&mut tx).await?;
        let post = insert_post(&posts, id, new, Utc::now())?;
        put(&mut tx, POSTS, id, &post).await?;
        tx.commit().await.map_err(db)?;
        Ok(post)
    }
    async fn update_post(&self, id: Id, upd: UpdateBlogPost) -> RepoResult<BlogPost> {
        let mut tx = self.begin().await?;
        let mut posts = load(&mut tx, POSTS).await?;
        let post = apply_post_update(&mut posts, id, upd, Utc::now())?;
        put(&mut tx, POSTS, id, &post).await?;
        tx.commit().await.map_err(db)?;
        Ok(post)
    }
    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let mut conn = self.conn().await?;
        if remove(&mut conn, POSTS, id).await? { Ok(()) } else { Err(RepoError::NotFound) }
    }
}
