use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_string_array, required_str, row_exists};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password);
    format!("{:x}", hasher.finalize())
}

/// Maps role names to distinct ids. Errors with the first unknown name.
fn role_ids(
    conn: &Connection,
    names: &[String],
) -> rusqlite::Result<Result<Vec<String>, String>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM roles WHERE name = ?",
                [name.to_ascii_lowercase()],
                |r| r.get(0),
            )
            .optional()?;
        match id {
            // Names differing only in case resolve to the same role.
            Some(id) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            None => return Ok(Err(name.clone())),
        }
    }
    Ok(Ok(ids))
}

fn parse_roles(
    req: &Request,
    conn: &Connection,
    v: Option<&JsonValue>,
) -> Result<Vec<String>, JsonValue> {
    let names = parse_string_array(v)
        .map_err(|m| err(&req.id, "bad_params", format!("roles {m}"), None))?;
    match role_ids(conn, &names) {
        Ok(Ok(ids)) => Ok(ids),
        Ok(Err(name)) => Err(err(
            &req.id,
            "bad_params",
            format!("unknown role: {name}"),
            Some(json!({ "role": name })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn replace_roles(tx: &Transaction<'_>, user_id: &str, role_ids: &[String]) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM user_roles WHERE user_id = ?", [user_id])?;
    for role_id in role_ids {
        tx.execute(
            "INSERT INTO user_roles(user_id, role_id) VALUES(?, ?)",
            (user_id, role_id),
        )?;
    }
    Ok(())
}

fn handle_users_list(state: &mut AppState, req: &Request) -> JsonValue {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "users": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           u.id,
           u.username,
           COALESCE((
             SELECT GROUP_CONCAT(r.name, ',')
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = u.id
           ), '') AS role_names
         FROM users u
         ORDER BY u.username",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            let role_names: String = row.get(2)?;
            let mut roles: Vec<&str> = role_names.split(',').filter(|s| !s.is_empty()).collect();
            roles.sort_unstable();
            Ok(json!({ "id": id, "username": username, "roles": roles }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };
    if password.is_empty() {
        return err(&req.id, "bad_params", "password must not be empty", None);
    }
    let role_ids = match parse_roles(req, conn, req.params.get("roles")) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let user_id = Uuid::new_v4().to_string();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO users(id, username, password_hash) VALUES(?, ?, ?)",
        (&user_id, &username, hash_password(password)),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }
    if let Err(e) = replace_roles(&tx, &user_id, &role_ids) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "user_roles" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(user = %username, "user created");
    ok(&req.id, json!({ "userId": user_id, "username": username }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let mut username: Option<String> = None;
    let mut password_hash: Option<String> = None;
    let mut role_ids: Option<Vec<String>> = None;
    for (key, v) in patch {
        match key.as_str() {
            "username" => match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => username = Some(s.to_string()),
                None => {
                    return err(&req.id, "bad_params", "patch.username must not be empty", None)
                }
            },
            "password" => match v.as_str().filter(|s| !s.is_empty()) {
                Some(s) => password_hash = Some(hash_password(s)),
                None => {
                    return err(&req.id, "bad_params", "patch.password must not be empty", None)
                }
            },
            "roles" => match parse_roles(req, conn, Some(v)) {
                Ok(ids) => role_ids = Some(ids),
                Err(e) => return e,
            },
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown patch field: {key}"),
                    Some(json!({ "field": key })),
                )
            }
        }
    }

    match row_exists(conn, "users", &user_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Some(username) = &username {
        if let Err(e) = tx.execute("UPDATE users SET username = ? WHERE id = ?", (username, &user_id)) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "users" })),
            );
        }
    }
    if let Some(hash) = &password_hash {
        if let Err(e) = tx.execute("UPDATE users SET password_hash = ? WHERE id = ?", (hash, &user_id)) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "users" })),
            );
        }
    }
    if let Some(ids) = &role_ids {
        if let Err(e) = replace_roles(&tx, &user_id, ids) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "user_roles" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match row_exists(conn, "users", &user_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // Courses outlive their teacher; enrolments and role grants do not.
    for (table, sql) in [
        ("course_students", "DELETE FROM course_students WHERE user_id = ?"),
        ("user_roles", "DELETE FROM user_roles WHERE user_id = ?"),
        ("courses", "UPDATE courses SET teacher_id = NULL WHERE teacher_id = ?"),
        ("users", "DELETE FROM users WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&user_id]) {
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

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.update" => Some(handle_users_update(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_resolve_case_insensitively_without_duplicates() {
        let conn = Connection::open_in_memory().expect("open memory db");
        crate::db::create_schema(&conn).expect("schema");
        conn.execute("INSERT INTO roles(id, name) VALUES('r-admin', 'admin')", [])
            .expect("seed admin");
        conn.execute("INSERT INTO roles(id, name) VALUES('r-student', 'student')", [])
            .expect("seed student");

        let names: Vec<String> = ["admin", "ADMIN", "Student", "admin"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ids = role_ids(&conn, &names).expect("query").expect("known roles");
        assert_eq!(ids, vec!["r-admin".to_string(), "r-student".to_string()]);

        let names = vec!["admin".to_string(), "wizard".to_string()];
        let unknown = role_ids(&conn, &names).expect("query").expect_err("unknown role");
        assert_eq!(unknown, "wizard");
    }

    #[test]
    fn password_hash_is_sha256_hex() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
