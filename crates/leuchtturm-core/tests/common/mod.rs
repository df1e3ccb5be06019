#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use leuchtturm_core::*;
use serde_json::{json, Value};

/// Shared log of every side effect, in call order.
pub type Log = Arc<Mutex<Vec<String>>>;

struct RelationSetup {
    kind: RelationshipKind,
    target: Arc<MemoryDao>,
    foreign_key: String,
}

/// In-memory [`Dao`] recording what resolvers do to it.
pub struct MemoryDao {
    model: &'static str,
    rows: Mutex<BTreeMap<i64, Record>>,
    pivots: Mutex<Vec<(String, i64, i64)>>,
    relations: HashMap<String, RelationSetup>,
    log: Log,
}

impl MemoryDao {
    pub fn new(model: &'static str, log: &Log) -> Self {
        MemoryDao {
            model,
            rows: Mutex::new(BTreeMap::new()),
            pivots: Mutex::new(Vec::new()),
            relations: HashMap::new(),
            log: log.clone(),
        }
    }

    pub fn one_to_many(mut self, field: &str, target: &Arc<MemoryDao>, foreign_key: &str) -> Self {
        self.relations.insert(
            field.to_string(),
            RelationSetup {
                kind: RelationshipKind::OneToMany,
                target: target.clone(),
                foreign_key: foreign_key.to_string(),
            },
        );
        self
    }

    pub fn many_to_many(mut self, field: &str, target: &Arc<MemoryDao>) -> Self {
        self.relations.insert(
            field.to_string(),
            RelationSetup {
                kind: RelationshipKind::ManyToMany,
                target: target.clone(),
                foreign_key: String::new(),
            },
        );
        self
    }

    pub fn many_to_one(mut self, field: &str, target: &Arc<MemoryDao>) -> Self {
        self.relations.insert(
            field.to_string(),
            RelationSetup {
                kind: RelationshipKind::ManyToOne,
                target: target.clone(),
                foreign_key: String::new(),
            },
        );
        self
    }

    /// Seed a row. The value must be an object carrying an `id`.
    pub fn seed(&self, row: Value) {
        let record = row.as_object().cloned().expect("row must be an object");
        let id = record["id"].as_i64().expect("row must have an id");
        self.rows.lock().unwrap().insert(id, record);
    }

    pub fn row(&self, id: i64) -> Option<Record> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn pivots(&self, field: &str) -> Vec<(i64, i64)> {
        self.pivots
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _, _)| f == field)
            .map(|(_, owner, related)| (*owner, *related))
            .collect()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn id_of(record: &Record) -> Result<i64, DaoError> {
        record_id(record).ok_or_else(|| DaoError::Backend("record has no id".into()))
    }
}

impl Dao for MemoryDao {
    fn create(&self, fields: &Record) -> Result<Record, DaoError> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        let mut record = fields.clone();
        record.insert("id".into(), json!(id));
        rows.insert(id, record.clone());
        self.record(format!("create {} {id}", self.model));
        Ok(record)
    }

    fn get(&self, id: i64) -> Result<Record, DaoError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DaoError::NotFound {
                model: ModelId::new(self.model),
                id,
            })
    }

    fn all(&self) -> Result<Vec<Record>, DaoError> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    fn update(&self, record: &Record) -> Result<bool, DaoError> {
        let id = Self::id_of(record)?;
        self.record(format!("update {} {id}", self.model));
        Ok(self
            .rows
            .lock()
            .unwrap()
            .insert(id, record.clone())
            .is_some())
    }

    fn delete(&self, record: &Record) -> Result<bool, DaoError> {
        let id = Self::id_of(record)?;
        self.record(format!("delete {} {id}", self.model));
        Ok(self.rows.lock().unwrap().remove(&id).is_some())
    }

    fn relationship<'a>(
        &'a self,
        record: &Record,
        field: &str,
    ) -> Result<Box<dyn Relationship + 'a>, DaoError> {
        let setup = self
            .relations
            .get(field)
            .ok_or_else(|| DaoError::Backend(format!("{} has no relation {field}", self.model)))?;
        Ok(Box::new(MemoryRelationship {
            owner: self,
            owner_id: Self::id_of(record)?,
            field: field.to_string(),
            setup,
        }))
    }

    fn update_where(
        &self,
        column: &str,
        value: &Value,
        changes: &Record,
    ) -> Result<u64, DaoError> {
        self.record(format!("update_where {} {column}={value}", self.model));
        let mut affected = 0;
        for row in self.rows.lock().unwrap().values_mut() {
            if row.get(column) == Some(value) {
                row.extend(changes.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }
}

struct MemoryRelationship<'a> {
    owner: &'a MemoryDao,
    owner_id: i64,
    field: String,
    setup: &'a RelationSetup,
}

impl Relationship for MemoryRelationship<'_> {
    fn kind(&self) -> RelationshipKind {
        self.setup.kind
    }

    fn associate(&self, related: &Record) -> Result<(), DaoError> {
        let related_id = MemoryDao::id_of(related)?;
        self.owner
            .record(format!("associate {} {related_id}", self.field));
        let mut rows = self.setup.target.rows.lock().unwrap();
        let row = rows
            .get_mut(&related_id)
            .ok_or_else(|| DaoError::Backend("associated row vanished".into()))?;
        row.insert(self.setup.foreign_key.clone(), json!(self.owner_id));
        Ok(())
    }

    fn attach(&self, related: &Record) -> Result<(), DaoError> {
        let related_id = MemoryDao::id_of(related)?;
        self.owner.record(format!("attach {} {related_id}", self.field));
        self.owner
            .pivots
            .lock()
            .unwrap()
            .push((self.field.clone(), self.owner_id, related_id));
        Ok(())
    }

    fn detach(&self) -> Result<(), DaoError> {
        self.owner.record(format!("detach {}", self.field));
        self.owner
            .pivots
            .lock()
            .unwrap()
            .retain(|(f, owner, _)| !(f == &self.field && *owner == self.owner_id));
        Ok(())
    }

    fn get(&self) -> Result<Vec<Record>, DaoError> {
        let target = self.setup.target.rows.lock().unwrap();
        Ok(match self.setup.kind {
            RelationshipKind::OneToMany => target
                .values()
                .filter(|row| row.get(&self.setup.foreign_key) == Some(&json!(self.owner_id)))
                .cloned()
                .collect(),
            _ => self
                .owner
                .pivots(&self.field)
                .into_iter()
                .filter(|(owner, _)| *owner == self.owner_id)
                .filter_map(|(_, related)| target.get(&related).cloned())
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Validates `Authorization: Bearer <token>` and reports a fixed user.
pub struct TokenGuard {
    pub token: &'static str,
    pub user: i64,
}

impl Guardian for TokenGuard {
    fn validate(&self, request: &Request) -> bool {
        request.bearer_token() == Some(self.token)
    }

    fn user(&self, request: &Request) -> Option<Box<dyn Authenticatable>> {
        self.validate(request)
            .then(|| Box::new(Identity(self.user)) as Box<dyn Authenticatable>)
    }
}

/// `admin` accepts token `root`, `user` accepts token `u3` as user 3.
pub fn guards() -> Guards {
    Guards::new()
        .with("admin", TokenGuard { token: "root", user: 1 })
        .with("user", TokenGuard { token: "u3", user: 3 })
}

pub fn bearer(token: &str) -> Request {
    Request::new().header("Authorization", format!("Bearer {token}"))
}

pub fn args(value: Value) -> Args {
    value.as_object().cloned().expect("arguments must be an object")
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

pub fn user() -> ModelDescriptor {
    ModelDescriptor::new("tests::classes::User")
        .doc("/**\n * @property-read Login[] $logins\n */")
        .property(PropertyDecl::int("id"))
        .property(PropertyDecl::string("firstname"))
        .property(PropertyDecl::string("lastname"))
        .property(PropertyDecl::string("email"))
        .property(PropertyDecl::string("role"))
        .property(PropertyDecl::int("rights"))
        .property(PropertyDecl::bool("confirmed"))
        .property(PropertyDecl::string("birthday").nullable())
        .property(PropertyDecl::string("connector"))
        .parameter(ParameterDecl::new("firstname"))
        .parameter(ParameterDecl::new("lastname"))
        .parameter(ParameterDecl::new("email"))
        .parameter(ParameterDecl::new("role").default("USER"))
        .parameter(ParameterDecl::new("rights").default(0))
        .parameter(ParameterDecl::new("confirmed").default(false))
        .parameter(ParameterDecl::new("birthday").default(Value::Null))
}

pub fn login() -> ModelDescriptor {
    ModelDescriptor::new("tests::classes::Login")
        .doc("/**\n * @property-read User $user\n * @protect $user userguard\n */")
        .property(PropertyDecl::int("id"))
        .property(PropertyDecl::int("user_id"))
        .property(PropertyDecl::string("timestamp"))
        .property(PropertyDecl::string("connector"))
}

pub fn role() -> ModelDescriptor {
    ModelDescriptor::new("tests::classes::Role")
        .property(PropertyDecl::int("id"))
        .property(PropertyDecl::string("name"))
}

pub struct Fixture {
    pub manager: Manager,
    pub users: Arc<MemoryDao>,
    pub logins: Arc<MemoryDao>,
    pub roles: Arc<MemoryDao>,
    pub log: Log,
}

impl Fixture {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

/// Users with logins (one-to-many on `user_id`) and roles (many-to-many).
pub fn fixture() -> Fixture {
    let log = Log::default();
    let logins = Arc::new(MemoryDao::new("Login", &log));
    let roles = Arc::new(MemoryDao::new("Role", &log));
    let users = Arc::new(
        MemoryDao::new("User", &log)
            .one_to_many("logins", &logins, "user_id")
            .many_to_many("roles", &roles),
    );

    let manager = Manager::new();
    manager.register(
        user().relation(RelationDecl::has_many("roles", "Role")),
        users.clone(),
    );
    manager.register(login(), logins.clone());
    manager.register(role(), roles.clone());

    Fixture {
        manager,
        users,
        logins,
        roles,
        log,
    }
}

pub fn user_row(id: i64) -> Value {
    json!({
        "id": id,
        "firstname": "Ada",
        "lastname": "Lovelace",
        "email": "ada@example.com",
        "role": "USER",
        "rights": 0,
        "confirmed": false,
        "birthday": null,
    })
}
