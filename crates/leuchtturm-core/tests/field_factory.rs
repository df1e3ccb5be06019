mod common;

use std::sync::{Arc, Mutex};

use common::*;
use leuchtturm_core::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const USER: &str = "tests::classes::User";

fn anonymous() -> Request {
    Request::new()
}

fn resolve(field: &ResolverField, request: &Request, arguments: Value) -> Result<Value> {
    let guards = guards();
    let ctx = ResolveContext::new(request, &guards);
    field.resolve(&ctx, &args(arguments))
}

#[test]
fn field_shapes() {
    let fixture = fixture();
    let m = &fixture.manager;

    let create = m.create(USER).unwrap().build().unwrap();
    assert_eq!(create.name(), "createUser");
    assert_eq!(create.field.ty.to_string(), "User");
    assert_eq!(create.field.args.len(), 1);
    assert_eq!(create.field.args[0].name, "user");
    assert_eq!(create.field.args[0].ty.to_string(), "UserInput!");

    let read = m.read(USER).unwrap().build().unwrap();
    assert_eq!(read.name(), "user");
    assert_eq!(read.field.ty.to_string(), "User");
    assert_eq!(read.field.args[0].ty.to_string(), "Int!");

    let update = m.update(USER).unwrap().build().unwrap();
    assert_eq!(update.field.ty.to_string(), "Boolean!");
    let names: Vec<&str> = update.field.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["id", "user"]);

    let delete = m.delete(USER).unwrap().build().unwrap();
    assert_eq!(delete.name(), "deleteUser");
    assert_eq!(delete.field.ty.to_string(), "Boolean!");

    let all = m.all(USER).unwrap().build().unwrap();
    assert_eq!(all.name(), "allUsers");
    assert_eq!(all.field.ty.to_string(), "[User!]!");
    assert!(all.field.args.is_empty());
}

#[test]
fn read_and_all() {
    let fixture = fixture();
    fixture.users.seed(user_row(1));
    fixture.users.seed(user_row(2));

    let read = fixture.manager.read(USER).unwrap().build().unwrap();
    let user = resolve(&read, &anonymous(), json!({"id": 2})).unwrap();
    assert_eq!(user["id"], 2);
    assert_eq!(user["firstname"], "Ada");

    let err = resolve(&read, &anonymous(), json!({"id": 9})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(!err.is_unauthorized());

    let all = fixture.manager.all(USER).unwrap().build().unwrap();
    let users = resolve(&all, &anonymous(), json!({})).unwrap();
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[test]
fn create_links_every_listed_id_once() {
    let fixture = fixture();
    fixture.logins.seed(json!({"id": 10, "user_id": null, "timestamp": "t1"}));
    fixture.logins.seed(json!({"id": 11, "user_id": null, "timestamp": "t2"}));
    fixture.roles.seed(json!({"id": 1, "name": "admin"}));
    fixture.roles.seed(json!({"id": 2, "name": "editor"}));

    let create = fixture.manager.create(USER).unwrap().build().unwrap();
    let mut input = user_row(0);
    input.as_object_mut().unwrap().remove("id");
    input["logins"] = json!([10, 11]);
    input["roles"] = json!([2]);

    let user = resolve(&create, &anonymous(), json!({"user": input})).unwrap();
    assert_eq!(user["id"], 1);
    assert!(user.get("logins").is_none());
    assert!(user.get("roles").is_none());

    assert_eq!(
        fixture.log(),
        vec![
            "create User 1",
            "associate logins 10",
            "associate logins 11",
            "attach roles 2",
        ]
    );
    assert_eq!(fixture.logins.row(10).unwrap()["user_id"], 1);
    assert_eq!(fixture.users.pivots("roles"), vec![(1, 2)]);
    assert!(fixture.users.row(1).unwrap().get("logins").is_none());
}

#[test]
fn create_without_relation_lists_links_nothing() {
    let fixture = fixture();
    let create = fixture.manager.create(USER).unwrap().build().unwrap();
    let mut input = user_row(0);
    input.as_object_mut().unwrap().remove("id");

    resolve(&create, &anonymous(), json!({"user": input})).unwrap();
    assert_eq!(fixture.log(), vec!["create User 1"]);
}

#[test]
fn update_replaces_associations() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    fixture.logins.seed(json!({"id": 10, "user_id": 3, "timestamp": "t1"}));
    fixture.logins.seed(json!({"id": 11, "user_id": null, "timestamp": "t2"}));
    fixture.logins.seed(json!({"id": 12, "user_id": null, "timestamp": "t3"}));
    fixture.roles.seed(json!({"id": 1, "name": "admin"}));
    fixture.roles.seed(json!({"id": 2, "name": "editor"}));

    let create_roles = fixture.manager.update(USER).unwrap().build().unwrap();
    resolve(
        &create_roles,
        &anonymous(),
        json!({"id": 3, "user": {"roles": [1]}}),
    )
    .unwrap();
    fixture.clear_log();

    let update = fixture.manager.update(USER).unwrap().build().unwrap();
    let ok = resolve(
        &update,
        &anonymous(),
        json!({"id": 3, "user": {"firstname": "Grace", "logins": [11, 12], "roles": [2]}}),
    )
    .unwrap();
    assert_eq!(ok, json!(true));

    let log = fixture.log();
    // Stale foreign keys are cleared once per relation, not once per id.
    assert_eq!(
        log.iter().filter(|l| l.starts_with("update_where")).count(),
        1
    );
    assert_eq!(
        log,
        vec![
            "update_where Login user_id=3",
            "associate logins 11",
            "associate logins 12",
            "detach roles",
            "attach roles 2",
            "update User 3",
        ]
    );
    assert_eq!(fixture.logins.row(10).unwrap()["user_id"], Value::Null);
    assert_eq!(fixture.logins.row(12).unwrap()["user_id"], 3);
    assert_eq!(fixture.users.pivots("roles"), vec![(3, 2)]);

    let stored = fixture.users.row(3).unwrap();
    assert_eq!(stored["firstname"], "Grace");
    assert_eq!(stored["lastname"], "Lovelace");
    assert!(stored.get("logins").is_none());
}

#[test]
fn delete_reports_success() {
    let fixture = fixture();
    fixture.users.seed(user_row(5));
    let delete = fixture.manager.delete(USER).unwrap().build().unwrap();
    assert_eq!(resolve(&delete, &anonymous(), json!({"id": 5})).unwrap(), json!(true));
    assert_eq!(fixture.users.len(), 0);
    assert!(resolve(&delete, &anonymous(), json!({"id": 5})).is_err());
}

#[test]
fn missing_arguments_are_validation_errors() {
    let fixture = fixture();
    let read = fixture.manager.read(USER).unwrap().build().unwrap();
    let err = resolve(&read, &anonymous(), json!({"id": "one"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let create = fixture.manager.create(USER).unwrap().build().unwrap();
    let err = resolve(&create, &anonymous(), json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let update = fixture.manager.update(USER).unwrap().build().unwrap();
    let err = resolve(&update, &anonymous(), json!({"id": 1, "user": {"roles": "x"}})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[test]
fn guardian_gates_the_field() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    let read = fixture
        .manager
        .read(USER)
        .unwrap()
        .guardian("admin")
        .build()
        .unwrap();

    assert!(resolve(&read, &bearer("root"), json!({"id": 3})).is_ok());
    let err = resolve(&read, &bearer("u3"), json!({"id": 3})).unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Access denied");
    assert!(resolve(&read, &anonymous(), json!({"id": 3})).unwrap_err().is_unauthorized());
}

#[test]
fn owner_guardian_falls_back_to_ownership() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    fixture.users.seed(user_row(4));
    let read = fixture
        .manager
        .read(USER)
        .unwrap()
        .guardian("admin")
        .only_owner("user")
        .build()
        .unwrap();

    // Admin passes for any id.
    assert!(resolve(&read, &bearer("root"), json!({"id": 4})).is_ok());
    // The owner passes for their own id only.
    assert!(resolve(&read, &bearer("u3"), json!({"id": 3})).is_ok());
    assert!(resolve(&read, &bearer("u3"), json!({"id": 4})).unwrap_err().is_unauthorized());
    assert!(resolve(&read, &anonymous(), json!({"id": 3})).unwrap_err().is_unauthorized());
}

#[test]
fn owner_guardian_alone() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    let delete = fixture
        .manager
        .delete(USER)
        .unwrap()
        .only_owner("user")
        .build()
        .unwrap();

    assert!(resolve(&delete, &bearer("root"), json!({"id": 3})).unwrap_err().is_unauthorized());
    assert_eq!(resolve(&delete, &bearer("u3"), json!({"id": 3})).unwrap(), json!(true));
}

#[test]
fn owner_guardian_without_id_denies() {
    let fixture = fixture();
    let all = fixture
        .manager
        .all(USER)
        .unwrap()
        .only_owner("user")
        .build()
        .unwrap();
    assert!(resolve(&all, &bearer("u3"), json!({})).unwrap_err().is_unauthorized());
}

#[test]
fn denied_requests_never_touch_persistence() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    let delete = fixture
        .manager
        .delete(USER)
        .unwrap()
        .guardian("admin")
        .build()
        .unwrap();
    assert!(resolve(&delete, &bearer("u3"), json!({"id": 3})).is_err());
    assert!(fixture.log().is_empty());
    assert_eq!(fixture.users.len(), 1);
}

#[test]
fn failing_guardian_denies_every_operation() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    let cases = [
        (Operation::Create, json!({"user": {"firstname": "Eve"}})),
        (Operation::Read, json!({"id": 3})),
        (Operation::Update, json!({"id": 3, "user": {"firstname": "Eve"}})),
        (Operation::Delete, json!({"id": 3})),
        (Operation::All, json!({})),
    ];

    for (operation, arguments) in cases {
        let field = fixture
            .manager
            .field(operation, USER)
            .unwrap()
            .guardian("admin")
            .build()
            .unwrap();

        fixture.clear_log();
        let err = resolve(&field, &bearer("u3"), arguments.clone()).unwrap_err();
        assert!(err.is_unauthorized(), "{operation} was not denied");
        assert!(fixture.log().is_empty(), "{operation} reached persistence");

        assert!(
            resolve(&field, &bearer("root"), arguments).is_ok(),
            "{operation} denied the admin"
        );
    }
}

#[test]
fn owner_guardian_on_create_has_no_id_to_own() {
    let fixture = fixture();
    let input = json!({"user": {"firstname": "Eve"}});

    let create = fixture
        .manager
        .create(USER)
        .unwrap()
        .only_owner("user")
        .build()
        .unwrap();
    assert!(resolve(&create, &bearer("u3"), input.clone())
        .unwrap_err()
        .is_unauthorized());
    assert_eq!(fixture.users.len(), 0);

    // A validating plain guardian is enough on its own.
    let create = fixture
        .manager
        .create(USER)
        .unwrap()
        .guardian("admin")
        .only_owner("user")
        .build()
        .unwrap();
    assert!(resolve(&create, &bearer("root"), input.clone()).is_ok());
    assert!(resolve(&create, &bearer("u3"), input)
        .unwrap_err()
        .is_unauthorized());
    assert_eq!(fixture.users.len(), 1);
}

#[test]
fn unregistered_field_guards_are_not_enforced() {
    let fixture = fixture();
    fixture.users.seed(user_row(4));

    let all = fixture
        .manager
        .all(USER)
        .unwrap()
        .guardian("superuser")
        .build()
        .unwrap();
    assert!(resolve(&all, &anonymous(), json!({})).is_ok());

    // The plain guardian fails and the owner guardian does not exist.
    let read = fixture
        .manager
        .read(USER)
        .unwrap()
        .guardian("admin")
        .only_owner("tenant")
        .build()
        .unwrap();
    assert_eq!(resolve(&read, &bearer("u3"), json!({"id": 4})).unwrap()["id"], 4);

    let delete = fixture
        .manager
        .delete(USER)
        .unwrap()
        .only_owner("tenant")
        .build()
        .unwrap();
    assert_eq!(resolve(&delete, &anonymous(), json!({"id": 4})).unwrap(), json!(true));
}

// ---------------------------------------------------------------------------
// Hooks and rebuilding
// ---------------------------------------------------------------------------

#[test]
fn hooks_run_around_the_body() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    let events = Arc::new(Mutex::new(Vec::<String>::new()));

    let pre_events = events.clone();
    fixture.manager.hooks().register_pre("before", move || {
        pre_events.lock().unwrap().push("pre".into());
        Ok(())
    });
    let post_events = events.clone();
    fixture.manager.hooks().register_post("after", move |payload| {
        let entry = match payload {
            HookPayload::Outcome { record, success } => format!("post {} {success}", record["id"]),
            HookPayload::Record(record) => format!("post {}", record["id"]),
            HookPayload::Records(records) => format!("post {} records", records.len()),
        };
        post_events.lock().unwrap().push(entry);
        Ok(())
    });

    let delete = fixture
        .manager
        .delete(USER)
        .unwrap()
        .pre("before")
        .post("after")
        .build()
        .unwrap();
    resolve(&delete, &anonymous(), json!({"id": 3})).unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["pre", "post 3 true"]);

    let all = fixture.manager.all(USER).unwrap().post("after").build().unwrap();
    resolve(&all, &anonymous(), json!({})).unwrap();
    assert_eq!(events.lock().unwrap().last().unwrap(), "post 0 records");
}

#[test]
fn pre_hook_runs_after_guards() {
    let fixture = fixture();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    fixture.manager.hooks().register_pre("count", move || {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    let all = fixture
        .manager
        .all(USER)
        .unwrap()
        .guardian("admin")
        .pre("count")
        .build()
        .unwrap();
    assert!(resolve(&all, &anonymous(), json!({})).is_err());
    assert_eq!(*calls.lock().unwrap(), 0);
    resolve(&all, &bearer("root"), json!({})).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn failing_hook_aborts_the_resolver() {
    let fixture = fixture();
    fixture
        .manager
        .hooks()
        .register_pre("closed", || Err("maintenance window".into()));
    let create = fixture.manager.create(USER).unwrap().pre("closed").build().unwrap();
    let err = resolve(&create, &anonymous(), json!({"user": {}})).unwrap_err();
    assert_eq!(err.to_string(), "hook \"closed\" failed: maintenance window");
    assert!(fixture.log().is_empty());
}

#[test]
fn unknown_hook_fails_the_build() {
    let fixture = fixture();
    let err = fixture
        .manager
        .read(USER)
        .unwrap()
        .post("missing")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn incomplete_factory_fails_the_build() {
    let fixture = fixture();
    let err = FieldFactory::new(&fixture.manager)
        .operation(Operation::Read)
        .name("user")
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "field factory is missing its type factory");
}

#[test]
fn field_spec_rebuilds_an_equivalent_field() {
    let fixture = fixture();
    fixture.users.seed(user_row(3));
    fixture.manager.hooks().register_pre("noop", || Ok(()));

    let original = fixture
        .manager
        .read(USER)
        .unwrap()
        .name("account")
        .description("Fetch one account")
        .guardian("admin")
        .only_owner("user")
        .pre("noop")
        .build()
        .unwrap();

    let raw = serde_json::to_string(&original.spec).unwrap();
    let spec: FieldSpec = serde_json::from_str(&raw).unwrap();
    let rebuilt = fixture.manager.rebuild(&spec).unwrap();

    assert_eq!(rebuilt.spec, original.spec);
    assert_eq!(rebuilt.name(), "account");
    assert_eq!(rebuilt.field.description.as_deref(), Some("Fetch one account"));
    assert_eq!(rebuilt.field.ty, original.field.ty);
    assert!(resolve(&rebuilt, &bearer("u3"), json!({"id": 3})).is_ok());
    assert!(resolve(&rebuilt, &bearer("u3"), json!({"id": 4})).unwrap_err().is_unauthorized());
}

#[test]
fn explicit_dao_overrides_the_models() {
    let fixture = fixture();
    let log = Log::default();
    let other = Arc::new(MemoryDao::new("Archive", &log));
    other.seed(user_row(8));
    let read = fixture
        .manager
        .read(USER)
        .unwrap()
        .dao(other)
        .build()
        .unwrap();
    let user = resolve(&read, &anonymous(), json!({"id": 8})).unwrap();
    assert_eq!(user["id"], 8);
}
