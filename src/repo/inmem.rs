//! In-memory document store persisted as a JSON snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::*;

pub const SNAPSHOT_FILE: &str = "state.json";

#[derive(Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    roles: HashMap<Id, RoleDef>,
    refresh_tokens: HashMap<Id, RefreshTokenRecord>,
    categories: HashMap<Id, Category>,
    products: HashMap<Id, Product>,
    bags: HashMap<Id, Bag>,
    orders: HashMap<Id, Order>,
    recurring: HashMap<Id, RecurringOrder>,
    suppliers: HashMap<Id, Supplier>,
    posts: HashMap<Id, BlogPost>,
    next_id: Id,
}

impl State {
    fn seeded() -> Self {
        let roles: HashMap<Id, RoleDef> = builtin_roles(Utc::now()).into_iter().map(|r| (r.id, r)).collect();
        let next_id = roles.keys().copied().max().unwrap_or(0);
        Self {
            users: HashMap::new(),
            roles,
            refresh_tokens: HashMap::new(),
            categories: HashMap::new(),
            products: HashMap::new(),
            bags: HashMap::new(),
            orders: HashMap::new(),
            recurring: HashMap::new(),
            suppliers: HashMap::new(),
            posts: HashMap::new(),
            next_id,
        }
    }

    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

pub const SERVER_LOCK_FILE: &str = "server.lock";

/// Marks a data directory as owned by a running server; removed on drop.
#[derive(Debug)]
pub struct ServerLock {
    path: PathBuf,
}

impl Drop for ServerLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("could not remove '{}': {e}", self.path.display());
        }
    }
}

#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Store that never touches disk.
    pub fn ephemeral() -> Self {
        Self { state: Arc::new(RwLock::new(State::seeded())), snapshot_path: None }
    }

    /// Opens (or starts) the snapshot in `data_dir`. A missing snapshot starts
    /// a fresh store; an unreadable one is an error so it is never overwritten.
    pub fn open(data_dir: &Path) -> RepoResult<Self> {
        let path = data_dir.join(SNAPSHOT_FILE);
        let state = match std::fs::read(&path) {
            Ok(bytes) => {
                let s: State = serde_json::from_slice(&bytes)
                    .map_err(|e| RepoError::Internal(format!("corrupt snapshot '{}': {e}", path.display())))?;
                info!("loaded snapshot '{}'", path.display());
                s
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no snapshot at '{}', starting fresh", path.display());
                State::seeded()
            }
            Err(e) => return Err(RepoError::Internal(format!("read '{}': {e}", path.display()))),
        };
        Ok(Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) })
    }

    /// Claims `data_dir` for a server. A lock left behind by a crashed server
    /// is taken over.
    pub fn lock_for_server(data_dir: &Path) -> RepoResult<ServerLock> {
        std::fs::create_dir_all(data_dir).map_err(|e| RepoError::Internal(e.to_string()))?;
        let path = data_dir.join(SERVER_LOCK_FILE);
        if path.exists() {
            warn!("taking over '{}' from an earlier server", path.display());
        }
        std::fs::write(&path, std::process::id().to_string()).map_err(|e| RepoError::Internal(e.to_string()))?;
        Ok(ServerLock { path })
    }

    /// Opens `data_dir` for a one-off command. Refused while a server owns it:
    /// the server keeps its own copy of the state and its next snapshot would
    /// overwrite whatever the command wrote.
    pub fn open_offline(data_dir: &Path) -> RepoResult<Self> {
        let lock = data_dir.join(SERVER_LOCK_FILE);
        if lock.exists() {
            return Err(RepoError::Conflict(format!(
                "a server is using '{}'; stop it first (or delete '{}' if none is running)",
                data_dir.display(),
                lock.display()
            )));
        }
        Self::open(data_dir)
    }

    /// Writes the current state to disk (no-op for ephemeral stores).
    pub fn flush(&self) -> RepoResult<()> {
        let s = self.read()?;
        self.persist(&s)
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Runs `f` under the write lock and persists on success.
    fn mutate<R>(&self, f: impl FnOnce(&mut State, DateTime<Utc>) -> RepoResult<R>) -> RepoResult<R> {
        let mut s = self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))?;
        let out = f(&mut *s, Utc::now())?;
        if let Err(e) = self.persist(&s) {
            // the in-memory state stays authoritative; the next write retries
            warn!("snapshot write failed: {e}");
        }
        Ok(out)
    }

    fn persist(&self, s: &State) -> RepoResult<()> {
        let Some(path) = self.snapshot_path.as_deref() else { return Ok(()) };
        let bytes = serde_json::to_vec_pretty(s).map_err(|e| RepoError::Internal(e.to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| RepoError::Internal(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| RepoError::Internal(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| RepoError::Internal(e.to_string()))
    }
}

fn sorted_by_id<T: Clone>(m: &HashMap<Id, T>, id: impl Fn(&T) -> Id) -> Vec<T> {
    let mut v: Vec<T> = m.values().cloned().collect();
    v.sort_by_key(|x| id(x));
    v
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        self.mutate(|s, now| {
            let id = s.next_id + 1;
            let user = insert_user(&s.users, id, new, now)?;
            s.next_id();
            s.users.insert(id, user.clone());
            Ok(user)
        })
    }
    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        let email = email.trim().to_lowercase();
        self.read()?.users.values().find(|u| u.email == email).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_users(&self) -> RepoResult<Vec<User>> {
        Ok(sorted_by_id(&self.read()?.users, |u| u.id))
    }
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
        self.mutate(|s, now| {
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            apply_user_update(user, upd, now);
            Ok(user.clone())
        })
    }
    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s, _| {
            s.users.remove(&id).ok_or(RepoError::NotFound)?;
            s.bags.remove(&id);
            Ok(())
        })
    }
}

#[async_trait]
impl RoleRepo for InMemRepo {
    async fn list_roles(&self) -> RepoResult<Vec<RoleDef>> {
        Ok(sorted_by_id(&self.read()?.roles, |r| r.id))
    }
    async fn get_role(&self, name: &str) -> RepoResult<RoleDef> {
        self.read()?.roles.values().find(|r| r.name == name).cloned().ok_or(RepoError::NotFound)
    }
    async fn create_role(&self, new: NewRole) -> RepoResult<RoleDef> {
        self.mutate(|s, now| {
            let id = s.next_id + 1;
            let role = insert_role(&s.roles, id, new, now)?;
            s.next_id();
            s.roles.insert(id, role.clone());
            Ok(role)
        })
    }
    async fn update_role(&self, name: &str, upd: UpdateRole) -> RepoResult<RoleDef> {
        self.mutate(|s, _| {
            let role = s.roles.values_mut().find(|r| r.name == name).ok_or(RepoError::NotFound)?;
            apply_role_update(role, upd)?;
            Ok(role.clone())
        })
    }
    async fn delete_role(&self, name: &str) -> RepoResult<()> {
        self.mutate(|s, _| {
            let role = s.roles.values().find(|r| r.name == name).ok_or(RepoError::NotFound)?;
            check_role_deletable(role, s.users.values())?;
            let id = role.id;
            s.roles.remove(&id);
            Ok(())
        })
    }
}

#[async_trait]
impl TokenRepo for InMemRepo {
    async fn store_refresh_token(&self, user_id: Id, token_hash: &str, expires_at: DateTime<Utc>) -> RepoResult<RefreshTokenRecord> {
        self.mutate(|s, now| {
            if s.refresh_tokens.values().any(|t| t.token_hash == token_hash) {
                return Err(RepoError::Conflict("token already stored".into()));
            }
            let id = s.next_id();
            let rec = RefreshTokenRecord { id, user_id, token_hash: token_hash.to_string(), expires_at, created_at: now, revoked_at: None, replaced_by: None };
            // expired records are dead weight; drop them while we hold the lock
            s.refresh_tokens.retain(|_, t| t.expires_at > now);
            s.refresh_tokens.insert(id, rec.clone());
            Ok(rec)
        })
    }
    async fn find_refresh_token(&self, token_hash: &str) -> RepoResult<RefreshTokenRecord> {
        self.read()?.refresh_tokens.values().find(|t| t.token_hash == token_hash).cloned().ok_or(RepoError::NotFound)
    }
    async fn revoke_refresh_token(&self, id: Id, replaced_by: Option<Id>) -> RepoResult<()> {
        self.mutate(|s, now| {
            let t = s.refresh_tokens.get_mut(&id).ok_or(RepoError::NotFound)?;
            if t.revoked_at.is_none() { t.revoked_at = Some(now); }
            if replaced_by.is_some() { t.replaced_by = replaced_by; }
            Ok(())
        })
    }
    async fn revoke_user_tokens(&self, user_id: Id) -> RepoResult<usize> {
        self.mutate(|s, now| {
            let mut n = 0;
            for t in s.refresh_tokens.values_mut().filter(|t| t.user_id == user_id && t.revoked_at.is_none()) {
                t.revoked_at = Some(now);
                n += 1;
            }
            Ok(n)
        })
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let mut v = sorted_by_id(&self.read()?.categories, |c| c.id);
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }
    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read()?.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Category> {
        self.read()?.categories.values().find(|c| c.slug == slug).cloned().ok_or(RepoError::NotFound)
    }
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        self.mutate(|s, now| {
            let id = s.next_id + 1;
            let cat = insert_category(&s.categories, id, new, now)?;
            s.next_id();
            s.categories.insert(id, cat.clone());
            Ok(cat)
        })
    }
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
        self.mutate(|s, _| apply_category_update(&mut s.categories, id, upd))
    }
    async fn delete_category(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s, _| {
            if !s.categories.contains_key(&id) { return Err(RepoError::NotFound); }
            check_category_deletable(id, s.products.values())?;
            s.categories.remove(&id);
            Ok(())
        })
    }
}

#[async_trait]
impl ProductRepo for InMemRepo {
    async fn list_products(&self) -> RepoResult<Vec<Product>> {
        Ok(sorted_by_id(&self.read()?.products, |p| p.id))
    }
    async fn get_product(&self, id: Id) -> RepoResult<Product> {
        self.read()?.products.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn get_product_by_slug(&self, slug: &str) -> RepoResult<Product> {
        self.read()?.products.values().find(|p| p.slug == slug).cloned().ok_or(RepoError::NotFound)
    }
    async fn create_product(&self, new: NewProduct) -> RepoResult<Product> {
        self.mutate(|s, now| {
            let id = s.next_id + 1;
            let p = insert_product(&s.products, id, new, now)?;
            s.next_id();
            s.products.insert(id, p.clone());
            Ok(p)
        })
    }
    async fn update_product(&self, id: Id, upd: UpdateProduct) -> RepoResult<Product> {
        self.mutate(|s, now| apply_product_update(&mut s.products, id, upd, now))
    }
    async fn delete_product(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s, _| {
            s.products.remove(&id).ok_or(RepoError::NotFound)?;
            for bag in s.bags.values_mut() {
                bag.items.retain(|i| i.product_id != id);
            }
            Ok(())
        })
    }
    async fn adjust_stock(&self, id: Id, delta: i64) -> RepoResult<Product> {
        self.mutate(|s, now| apply_stock_delta(&mut s.products, id, delta, now))
    }
    async fn reserve_stock(&self, items: &[BagItem]) -> RepoResult<Vec<Product>> {
        self.mutate(|s, now| reserve_in(&mut s.products, items, now))
    }
    async fn release_stock(&self, items: &[BagItem]) -> RepoResult<()> {
        self.mutate(|s, now| {
            release_in(&mut s.products, items, now);
            Ok(())
        })
    }
}

#[async_trait]
impl BagRepo for InMemRepo {
    async fn get_bag(&self, user_id: Id) -> RepoResult<Bag> {
        Ok(self.read()?.bags.get(&user_id).cloned().unwrap_or_else(|| Bag { user_id, items: vec![], updated_at: Utc::now() }))
    }
    async fn save_bag(&self, bag: Bag) -> RepoResult<Bag> {
        self.mutate(|s, now| {
            let bag = Bag { updated_at: now, ..bag };
            s.bags.insert(bag.user_id, bag.clone());
            Ok(bag)
        })
    }
    async fn clear_bag(&self, user_id: Id) -> RepoResult<()> {
        self.mutate(|s, _| {
            s.bags.remove(&user_id);
            Ok(())
        })
    }
}

#[async_trait]
impl OrderRepo for InMemRepo {
    async fn create_order(&self, new: NewOrder) -> RepoResult<Order> {
        self.mutate(|s, now| {
            let id = s.next_id();
            let order = build_order(id, new, now);
            s.orders.insert(id, order.clone());
            Ok(order)
        })
    }
    async fn get_order(&self, id: Id) -> RepoResult<Order> {
        self.read()?.orders.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_orders(&self) -> RepoResult<Vec<Order>> {
        let mut v = sorted_by_id(&self.read()?.orders, |o| o.id);
        v.reverse(); // newest first
        Ok(v)
    }
    async fn list_user_orders(&self, user_id: Id) -> RepoResult<Vec<Order>> {
        let mut v: Vec<Order> = self.list_orders().await?;
        v.retain(|o| o.user_id == user_id);
        Ok(v)
    }
    async fn set_order_status(&self, id: Id, status: OrderStatus) -> RepoResult<Order> {
        self.mutate(|s, now| {
            let order = s.orders.get_mut(&id).ok_or(RepoError::NotFound)?;
            transition_order(order, status, now)?;
            Ok(order.clone())
        })
    }
}

#[async_trait]
impl RecurringRepo for InMemRepo {
    async fn create_recurring(&self, new: NewRecurringOrder) -> RepoResult<RecurringOrder> {
        self.mutate(|s, now| {
            let id = s.next_id();
            let rec = build_recurring(id, new, now);
            s.recurring.insert(id, rec.clone());
            Ok(rec)
        })
    }
    async fn get_recurring(&self, id: Id) -> RepoResult<RecurringOrder> {
        self.read()?.recurring.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_recurring(&self) -> RepoResult<Vec<RecurringOrder>> {
        Ok(sorted_by_id(&self.read()?.recurring, |r| r.id))
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
        self.mutate(|s, now| {
            let rec = s.recurring.get_mut(&id).ok_or(RepoError::NotFound)?;
            Ok(claim_due(rec, expected, next_run_at, now).then(|| rec.clone()))
        })
    }
    async fn record_recurring_run(&self, id: Id, run: RecurringRun) -> RepoResult<RecurringOrder> {
        self.mutate(|s, now| {
            let rec = s.recurring.get_mut(&id).ok_or(RepoError::NotFound)?;
            apply_run(rec, run, now);
            Ok(rec.clone())
        })
    }
    async fn change_recurring(&self, id: Id, action: RecurringAction, now: DateTime<Utc>) -> RepoResult<RecurringOrder> {
        self.mutate(|s, _| {
            let rec = s.recurring.get_mut(&id).ok_or(RepoError::NotFound)?;
            apply_recurring_action(rec, action, now)?;
            Ok(rec.clone())
        })
    }
}

#[async_trait]
impl SupplierRepo for InMemRepo {
    async fn create_supplier(&self, new: NewSupplier) -> RepoResult<Supplier> {
        self.mutate(|s, now| {
            let email = new.email.trim().to_lowercase();
            if let Some(old) = check_supplier_email(&s.suppliers, &email)? {
                s.suppliers.remove(&old);
            }
            let id = s.next_id();
            let sup = build_supplier(id, new, now);
            s.suppliers.insert(id, sup.clone());
            Ok(sup)
        })
    }
    async fn get_supplier(&self, id: Id) -> RepoResult<Supplier> {
        self.read()?.suppliers.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>> {
        Ok(sorted_by_id(&self.read()?.suppliers, |s| s.id))
    }
    async fn set_supplier_status(&self, id: Id, status: SupplierStatus) -> RepoResult<Supplier> {
        self.mutate(|s, now| {
            let sup = s.suppliers.get_mut(&id).ok_or(RepoError::NotFound)?;
            sup.status = status;
            sup.reviewed_at = Some(now);
            Ok(sup.clone())
        })
    }
    async fn delete_supplier(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s, _| s.suppliers.remove(&id).map(|_| ()).ok_or(RepoError::NotFound))
    }
}

#[async_trait]
impl BlogRepo for InMemRepo {
    async fn list_posts(&self) -> RepoResult<Vec<BlogPost>> {
        let mut v = sorted_by_id(&self.read()?.posts, |p| p.id);
        v.sort_by(|a, b| b.published_at.unwrap_or(b.created_at).cmp(&a.published_at.unwrap_or(a.created_at)));
        Ok(v)
    }
    async fn get_post(&self, id: Id) -> RepoResult<BlogPost> {
        self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<BlogPost> {
        self.read()?.posts.values().find(|p| p.slug == slug).cloned().ok_or(RepoError::NotFound)
    }
    async fn create_post(&self, new: NewBlogPost) -> RepoResult<BlogPost> {
        self.mutate(|s, now| {
            let id = s.next_id + 1;
            let post = insert_post(&s.posts, id, new, now)?;
            s.next_id();
            s.posts.insert(id, post.clone());
            Ok(post)
        })
    }
    async fn update_post(&self, id: Id, upd: UpdateBlogPost) -> RepoResult<BlogPost> {
        self.mutate(|s, now| apply_post_update(&mut s.posts, id, upd, now))
    }
    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s, _| s.posts.remove(&id).map(|_| ()).ok_or(RepoError::NotFound))
    }
}
