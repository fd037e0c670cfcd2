use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str, row_exists};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_roles_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "roles": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           r.id,
           r.name,
           (SELECT COUNT(*) FROM user_roles ur WHERE ur.role_id = r.id) AS user_count
         FROM roles r
         ORDER BY r.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let user_count: i64 = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "userCount": user_count }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(roles) => ok(&req.id, json!({ "roles": roles })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_roles_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    // Role names are matched case-insensitively everywhere else.
    let name = match required_str(req, "name") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };

    let role_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute("INSERT INTO roles(id, name) VALUES(?, ?)", (&role_id, &name)) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "roles" })),
        );
    }
    tracing::info!(role = %name, "role created");
    ok(&req.id, json!({ "roleId": role_id, "name": name }))
}

fn handle_roles_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let role_id = match required_str(req, "roleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match row_exists(conn, "roles", &role_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "role not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (table, sql) in [
        ("user_roles", "DELETE FROM user_roles WHERE role_id = ?"),
        ("roles", "DELETE FROM roles WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&role_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roles.list" => Some(handle_roles_list(state, req)),
        "roles.create" => Some(handle_roles_create(state, req)),
        "roles.delete" => Some(handle_roles_delete(state, req)),
        _ => None,
    }
}
